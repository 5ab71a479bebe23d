//! Firecracker-containerd `ExtraData`.
//!
//! The in-VM agent expects the OCI spec and the IO proxy vsock ports to be
//! smuggled through the `options`/`spec` `Any` of Create and Exec.

use serde::{Deserialize, Serialize};

use crate::types::{Any, EXTRA_DATA_TYPE_URL};

#[derive(Clone, PartialEq, Eq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraData {
    #[prost(bytes = "vec", tag = "1")]
    pub json_spec: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub runc_options: Option<Any>,
    #[prost(uint32, tag = "3")]
    pub stdin_port: u32,
    #[prost(uint32, tag = "4")]
    pub stdout_port: u32,
    #[prost(uint32, tag = "5")]
    pub stderr_port: u32,
}

impl ExtraData {
    /// Wrap this message in an `Any` carrying the type URL the agent matches on.
    pub fn to_any(&self) -> Any {
        Any::pack(EXTRA_DATA_TYPE_URL, self)
    }
}
