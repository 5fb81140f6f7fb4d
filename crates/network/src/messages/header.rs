//! Message header structure.
//!
//! Every message starts with a fixed 20-byte header: the network magic
//! (message start marker), the command and the body length. The body follows
//! immediately.

use super::commands::{MessageCommand, COMMAND_SIZE};
use crate::error::FrameError;

/// Size of the message start marker
pub const MAGIC_SIZE: usize = 4;

/// Size of the serialized header
pub const HEADER_SIZE: usize = MAGIC_SIZE + COMMAND_SIZE + 4;

/// Network message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Network magic number (4 bytes)
    pub magic: u32,
    /// Command string (12 bytes, zero-padded)
    pub command: MessageCommand,
    /// Payload length (4 bytes)
    pub length: u32,
}

impl MessageHeader {
    /// Creates a new message header
    pub fn new(magic: u32, command: MessageCommand, length: u32) -> Self {
        Self {
            magic,
            command,
            length,
        }
    }

    /// Serializes header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..16].copy_from_slice(self.command.as_bytes());
        bytes[16..20].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }

    /// Deserializes header from the first `HEADER_SIZE` bytes.
    ///
    /// The caller has already checked the marker and the length of `bytes`.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self, FrameError> {
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

        let mut command_bytes = [0u8; COMMAND_SIZE];
        command_bytes.copy_from_slice(&bytes[4..16]);
        let command = MessageCommand::from_bytes(command_bytes)?;

        let length = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);

        Ok(Self {
            magic,
            command,
            length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_header() {
        let magic = 0xD9B4BEF9;
        let header = MessageHeader::new(magic, MessageCommand::INV, 37);

        let header_bytes = header.to_bytes();
        assert_eq!(header_bytes.len(), 20);
        assert_eq!(&header_bytes[..4], &[0xf9, 0xbe, 0xb4, 0xd9]);
        assert_eq!(&header_bytes[4..7], b"inv");
        assert_eq!(&header_bytes[16..], &37u32.to_le_bytes());

        let deserialized = MessageHeader::from_bytes(&header_bytes).unwrap();
        assert_eq!(header, deserialized);
    }

    #[test]
    fn test_header_with_bad_command() {
        let mut bytes = MessageHeader::new(1, MessageCommand::PING, 8).to_bytes();
        bytes[9] = b'\n';
        assert_eq!(MessageHeader::from_bytes(&bytes), Err(FrameError::InvalidCommand));
    }
}
