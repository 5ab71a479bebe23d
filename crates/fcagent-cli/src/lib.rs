//! fcagent CLI Library
//!
//! Subcommands for driving a firecracker-containerd agent: raw ttrpc calls,
//! container creation and process execution with stdio relay.

pub mod call_cmd;
pub mod connection;
pub mod create_cmd;
pub mod exec_cmd;
pub mod oci;
pub mod terminal;
