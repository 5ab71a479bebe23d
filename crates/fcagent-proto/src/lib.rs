//! fcagent Protocol Buffers
//!
//! Hand-maintained prost messages for talking to a firecracker-containerd
//! agent over ttrpc.
//!
//! This crate contains:
//! - the ttrpc envelope (`Request`, `Response`, frame header)
//! - the `containerd.task.v2.Task` request/response subset
//! - the firecracker `ExtraData` wrapper carried in `Any` payloads
//! - well-known types (`Any`, `Timestamp`) and `Mount`

#![allow(clippy::derive_partial_eq_without_eq)]

pub mod extradata;
pub mod methods;
pub mod task;
pub mod ttrpc;
pub mod types;

pub use extradata::ExtraData;
pub use types::{Any, Mount, Timestamp};
