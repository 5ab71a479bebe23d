//! Well-known protobuf types and the containerd `Mount` type.
//!
//! `prost-types` does not implement serde, and the `call` subcommand maps
//! every message to and from JSON, so these are declared locally.

use serde::{Deserialize, Serialize};

/// Type URL the agent expects for an [`crate::ExtraData`] payload.
pub const EXTRA_DATA_TYPE_URL: &str = "type.googleapis.com/ExtraData";

/// `google.protobuf.Any`
#[derive(Clone, PartialEq, Eq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Any {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

impl Any {
    /// Encode `message` and wrap it with the given type URL.
    pub fn pack<M: ::prost::Message>(type_url: impl Into<String>, message: &M) -> Self {
        Self {
            type_url: type_url.into(),
            value: message.encode_to_vec(),
        }
    }
}

/// `google.protobuf.Timestamp`
#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

/// `containerd.types.Mount`
#[derive(Clone, PartialEq, Eq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Mount {
    #[prost(string, tag = "1")]
    #[serde(rename = "type")]
    pub r#type: String,
    #[prost(string, tag = "2")]
    pub source: String,
    #[prost(string, tag = "3")]
    pub target: String,
    #[prost(string, repeated, tag = "4")]
    pub options: Vec<String>,
}
