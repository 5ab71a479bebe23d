//! ttrpc envelope and frame header.
//!
//! Every ttrpc message is a 10-byte header followed by a protobuf payload:
//!
//! ```text
//! +----------------+----------------+------+-------+
//! | length (u32be) | stream (u32be) | type | flags |
//! +----------------+----------------+------+-------+
//! ```

use crate::types::Any;

/// Size of the fixed frame header.
pub const MESSAGE_HEADER_LENGTH: usize = 10;

/// Largest payload a peer is allowed to send.
pub const MESSAGE_LENGTH_MAX: u32 = 4 << 20;

/// Frame type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Request = 0x1,
    Response = 0x2,
    Data = 0x3,
}

impl TryFrom<u8> for MessageType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x1 => Ok(Self::Request),
            0x2 => Ok(Self::Response),
            0x3 => Ok(Self::Data),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

/// Errors produced while decoding a frame header.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("unknown ttrpc message type {0:#x}")]
    UnknownType(u8),

    #[error("ttrpc message length {0} exceeds maximum {MESSAGE_LENGTH_MAX}")]
    TooLarge(u32),
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub stream_id: u32,
    pub message_type: MessageType,
    pub flags: u8,
}

impl FrameHeader {
    pub const fn new(length: u32, stream_id: u32, message_type: MessageType) -> Self {
        Self {
            length,
            stream_id,
            message_type,
            flags: 0,
        }
    }

    pub fn encode(&self) -> [u8; MESSAGE_HEADER_LENGTH] {
        let mut buf = [0u8; MESSAGE_HEADER_LENGTH];
        buf[0..4].copy_from_slice(&self.length.to_be_bytes());
        buf[4..8].copy_from_slice(&self.stream_id.to_be_bytes());
        buf[8] = self.message_type as u8;
        buf[9] = self.flags;
        buf
    }

    pub fn decode(buf: &[u8; MESSAGE_HEADER_LENGTH]) -> Result<Self, FrameError> {
        let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if length > MESSAGE_LENGTH_MAX {
            return Err(FrameError::TooLarge(length));
        }
        Ok(Self {
            length,
            stream_id: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            message_type: MessageType::try_from(buf[8])?,
            flags: buf[9],
        })
    }
}

/// `ttrpc.KeyValue`
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

/// `ttrpc.Request`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(string, tag = "1")]
    pub service: String,
    #[prost(string, tag = "2")]
    pub method: String,
    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
    #[prost(int64, tag = "4")]
    pub timeout_nano: i64,
    #[prost(message, repeated, tag = "5")]
    pub metadata: Vec<KeyValue>,
}

/// `google.rpc.Status`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Status {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<Any>,
}

/// `ttrpc.Response`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Response {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_big_endian() {
        let header = FrameHeader::new(0x0102, 3, MessageType::Request);
        assert_eq!(header.encode(), [0, 0, 1, 2, 0, 0, 0, 3, 1, 0]);
    }

    #[test]
    fn header_decode_matches_encode() {
        let header = FrameHeader::new(512, 7, MessageType::Response);
        assert_eq!(FrameHeader::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn header_rejects_unknown_type() {
        let buf = [0, 0, 0, 1, 0, 0, 0, 1, 9, 0];
        match FrameHeader::decode(&buf) {
            Err(FrameError::UnknownType(9)) => {}
            other => panic!("expected UnknownType, got {other:?}"),
        }
    }

    #[test]
    fn header_rejects_oversized_payload() {
        let header = FrameHeader::new(MESSAGE_LENGTH_MAX + 1, 1, MessageType::Response);
        assert!(matches!(
            FrameHeader::decode(&header.encode()),
            Err(FrameError::TooLarge(_))
        ));
    }
}
