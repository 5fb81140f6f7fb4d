//! Error types for the peer session layer.

use std::net::SocketAddr;

use thiserror::Error;

/// Payload encode/decode failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Payload ended before a field could be read.
    #[error("truncated payload: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required by the field being read.
        needed: usize,
        /// Bytes remaining in the payload.
        available: usize,
    },

    /// Payload carried bytes after its last field.
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    /// Inventory entry with a type this client does not track.
    #[error("invalid inventory type {0}")]
    InvalidInventoryType(u32),

    /// A length prefix that cannot be satisfied by the payload.
    #[error("invalid length prefix {0}")]
    InvalidLength(u64),

    /// A string field that is not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
}

/// Stream framing failures; every variant is a protocol violation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Unexpected bytes before the next message start marker.
    #[error("stream desynchronized: {offset} bytes before the message start")]
    Desynchronized {
        /// Number of bytes preceding the marker (or the whole buffer when no marker was found).
        offset: usize,
    },

    /// Declared body length exceeds the configured maximum.
    #[error("message too large: {length} bytes (max: {max})")]
    MessageTooLarge {
        /// Declared body length.
        length: usize,
        /// Configured limit.
        max: usize,
    },

    /// Command field is not NUL-padded ASCII.
    #[error("invalid command name")]
    InvalidCommand,

    /// Body of a known message type failed to decode.
    #[error("failed to decode '{command}' body: {source}")]
    Codec {
        /// Command name from the header.
        command: String,
        /// Underlying decode failure.
        #[source]
        source: CodecError,
    },
}

/// Errors that surface from the network layer to its caller.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Outbound connection could not be started.
    #[error("connection to {address} failed: {source}")]
    Connect {
        /// Peer address.
        address: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The readiness wait itself failed; the event loop cannot continue.
    #[error("readiness wait failed: {0}")]
    Poll(#[source] std::io::Error),

    /// Peer address string could not be parsed.
    #[error("invalid peer address '{0}'")]
    InvalidPeer(String),

    /// Stream framing error.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Payload codec error.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for network operations.
pub type NetworkResult<T> = std::result::Result<T, NetworkError>;
