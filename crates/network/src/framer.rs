//! Stream framing.
//!
//! Splits the byte stream received from a peer into messages. Each call to
//! [`Framer::decode`] either leaves the buffer untouched (not enough data),
//! removes exactly one message from its front, or reports a protocol
//! violation after which the connection must be dropped.

use bytes::{BufMut, BytesMut};

use crate::error::FrameError;
use crate::messages::{
    Message, MessageCodec, MessageHeader, WireCodec, HEADER_SIZE, MAGIC_SIZE,
};

#[derive(Debug, Clone)]
pub struct Framer<C = WireCodec> {
    magic: u32,
    max_payload_size: usize,
    codec: C,
}

impl Framer<WireCodec> {
    pub fn new(magic: u32, max_payload_size: usize) -> Self {
        Self::with_codec(magic, max_payload_size, WireCodec)
    }
}

impl<C: MessageCodec> Framer<C> {
    pub fn with_codec(magic: u32, max_payload_size: usize, codec: C) -> Self {
        Self {
            magic,
            max_payload_size,
            codec,
        }
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }

    /// Extracts the next message from the front of `src`.
    ///
    /// The buffer must start with the message start marker (or a prefix of
    /// it while more bytes are pending); anything else means bytes were
    /// lost or injected and the stream is desynchronized.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Message>, FrameError> {
        if src.is_empty() {
            return Ok(None);
        }

        let magic = self.magic.to_le_bytes();
        let prefix = src.len().min(MAGIC_SIZE);
        if src[..prefix] != magic[..prefix] {
            let offset = src
                .windows(MAGIC_SIZE)
                .position(|window| window == magic)
                .unwrap_or(src.len());
            return Err(FrameError::Desynchronized { offset });
        }

        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut raw_header = [0u8; HEADER_SIZE];
        raw_header.copy_from_slice(&src[..HEADER_SIZE]);
        let header = MessageHeader::from_bytes(&raw_header)?;

        let length = header.length as usize;
        if length > self.max_payload_size {
            return Err(FrameError::MessageTooLarge {
                length,
                max: self.max_payload_size,
            });
        }

        let frame_len = HEADER_SIZE + length;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(frame_len);
        self.codec
            .decode_payload(header.command, &frame[HEADER_SIZE..])
            .map(Some)
            .map_err(|source| FrameError::Codec {
                command: header.command.to_string(),
                source,
            })
    }

    /// Appends the complete encoded message (header and body) to `dst`.
    pub fn encode(&self, message: &Message, dst: &mut BytesMut) {
        let mut body = BytesMut::new();
        self.codec.encode_payload(message, &mut body);

        let header = MessageHeader::new(self.magic, message.command(), body.len() as u32);
        dst.reserve(HEADER_SIZE + body.len());
        dst.put_slice(&header.to_bytes());
        dst.put_slice(&body);
    }

    /// Encodes `message` into a fresh buffer.
    pub fn to_bytes(&self, message: &Message) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode(message, &mut buf);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::messages::{Hash256, InventoryVector, MessageCommand};

    const MAGIC: u32 = 0xD9B4BEF9;

    fn framer() -> Framer {
        Framer::new(MAGIC, 1024)
    }

    #[test]
    fn test_split_header() {
        let framer = framer();
        let encoded = framer.to_bytes(&Message::Verack);
        assert_eq!(encoded.len(), HEADER_SIZE);

        let mut buf = BytesMut::from(&encoded[..10]);
        assert_eq!(framer.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], &encoded[..10]);

        buf.extend_from_slice(&encoded[10..]);
        assert_eq!(framer.decode(&mut buf).unwrap(), Some(Message::Verack));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_body_leaves_buffer_unchanged() {
        let framer = framer();
        let message = Message::Inv(vec![InventoryVector::block(Hash256::new([1; 32]))]);
        let encoded = framer.to_bytes(&message);

        let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);
        assert_eq!(framer.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), encoded.len() - 1);

        buf.extend_from_slice(&encoded[encoded.len() - 1..]);
        assert_eq!(framer.decode(&mut buf).unwrap(), Some(message));
    }

    #[test]
    fn test_extracts_one_message_at_a_time() {
        let framer = framer();
        let mut buf = framer.to_bytes(&Message::Ping(Some(7)));
        framer.encode(&Message::Verack, &mut buf);
        framer.encode(&Message::Pong(7), &mut buf);

        assert_eq!(framer.decode(&mut buf).unwrap(), Some(Message::Ping(Some(7))));
        assert_eq!(&buf[..MAGIC_SIZE], &MAGIC.to_le_bytes());
        assert_eq!(framer.decode(&mut buf).unwrap(), Some(Message::Verack));
        assert_eq!(framer.decode(&mut buf).unwrap(), Some(Message::Pong(7)));
        assert_eq!(framer.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_gap_before_marker() {
        let framer = framer();
        let mut buf = BytesMut::from(&b"junk"[..]);
        framer.encode(&Message::Verack, &mut buf);

        assert_eq!(
            framer.decode(&mut buf),
            Err(FrameError::Desynchronized { offset: 4 })
        );
    }

    #[test]
    fn test_garbage_without_marker() {
        let framer = framer();
        let mut buf = BytesMut::from(&[0x00, 0x01][..]);
        assert_eq!(
            framer.decode(&mut buf),
            Err(FrameError::Desynchronized { offset: 2 })
        );
    }

    #[test]
    fn test_marker_prefix_waits() {
        let framer = framer();
        let mut buf = BytesMut::from(&MAGIC.to_le_bytes()[..3]);
        assert_eq!(framer.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let framer = framer();
        let header = MessageHeader::new(MAGIC, MessageCommand::BLOCK, 4096);
        let mut buf = BytesMut::from(&header.to_bytes()[..]);
        assert_eq!(
            framer.decode(&mut buf),
            Err(FrameError::MessageTooLarge {
                length: 4096,
                max: 1024
            })
        );
    }

    #[test]
    fn test_undecodable_known_body() {
        let framer = framer();
        let header = MessageHeader::new(MAGIC, MessageCommand::PONG, 2);
        let mut buf = BytesMut::from(&header.to_bytes()[..]);
        buf.extend_from_slice(&[1, 2]);

        let err = framer.decode(&mut buf).unwrap_err();
        assert_eq!(
            err,
            FrameError::Codec {
                command: "pong".to_string(),
                source: CodecError::Truncated {
                    needed: 8,
                    available: 2
                }
            }
        );
    }

    #[test]
    fn test_unknown_command_is_not_a_violation() {
        let framer = framer();
        let command = MessageCommand::new("feefilter");
        let header = MessageHeader::new(MAGIC, command, 8);
        let mut buf = BytesMut::from(&header.to_bytes()[..]);
        buf.extend_from_slice(&[0u8; 8]);

        let message = framer.decode(&mut buf).unwrap().unwrap();
        assert_eq!(message.command(), command);
        assert!(buf.is_empty());
    }
}
