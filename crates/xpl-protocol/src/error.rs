//! Error types for wire encoding and decoding

use thiserror::Error;

/// Errors that can occur while building or parsing protocol datagrams
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Caller-supplied parameters cannot be represented on the wire
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Inbound bytes do not decode as the claimed message shape
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
}
