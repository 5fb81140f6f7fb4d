//! Message command definitions.
//!
//! The command is the 12-byte, NUL-padded ASCII type tag carried in every
//! message header.

use std::fmt;

use crate::error::FrameError;

/// Length of the command field in the header
pub const COMMAND_SIZE: usize = 12;

/// Network message command (12 bytes, zero-padded)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageCommand([u8; COMMAND_SIZE]);

impl MessageCommand {
    /// Version command
    pub const VERSION: MessageCommand = MessageCommand(*b"version\0\0\0\0\0");
    /// Version acknowledgment command
    pub const VERACK: MessageCommand = MessageCommand(*b"verack\0\0\0\0\0\0");
    /// Addresses command
    pub const ADDR: MessageCommand = MessageCommand(*b"addr\0\0\0\0\0\0\0\0");
    /// Get addresses command
    pub const GETADDR: MessageCommand = MessageCommand(*b"getaddr\0\0\0\0\0");
    /// Inventory command
    pub const INV: MessageCommand = MessageCommand(*b"inv\0\0\0\0\0\0\0\0\0");
    /// Get data command
    pub const GETDATA: MessageCommand = MessageCommand(*b"getdata\0\0\0\0\0");
    /// Not found command
    pub const NOTFOUND: MessageCommand = MessageCommand(*b"notfound\0\0\0\0");
    /// Block command
    pub const BLOCK: MessageCommand = MessageCommand(*b"block\0\0\0\0\0\0\0");
    /// Transaction command
    pub const TX: MessageCommand = MessageCommand(*b"tx\0\0\0\0\0\0\0\0\0\0");
    /// Ping command
    pub const PING: MessageCommand = MessageCommand(*b"ping\0\0\0\0\0\0\0\0");
    /// Pong command
    pub const PONG: MessageCommand = MessageCommand(*b"pong\0\0\0\0\0\0\0\0");

    /// Creates a command from string, truncated to 12 bytes
    pub fn new(cmd: &str) -> Self {
        let mut bytes = [0u8; COMMAND_SIZE];
        let cmd_bytes = cmd.as_bytes();
        let len = std::cmp::min(cmd_bytes.len(), COMMAND_SIZE);
        bytes[..len].copy_from_slice(&cmd_bytes[..len]);
        Self(bytes)
    }

    /// Parses the raw header field.
    ///
    /// The name must be printable ASCII followed only by NUL padding.
    pub fn from_bytes(bytes: [u8; COMMAND_SIZE]) -> Result<Self, FrameError> {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(COMMAND_SIZE);
        let (name, padding) = bytes.split_at(end);
        if !name.iter().all(|b| b.is_ascii_graphic()) || padding.iter().any(|&b| b != 0) {
            return Err(FrameError::InvalidCommand);
        }
        Ok(Self(bytes))
    }

    /// Raw header field
    pub fn as_bytes(&self) -> &[u8; COMMAND_SIZE] {
        &self.0
    }

    /// Command name without padding
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(COMMAND_SIZE);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }
}

impl fmt::Display for MessageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for MessageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageCommand({:?})", self.as_str())
    }
}
