//! Message body codec.
//!
//! The framer owns the envelope (header and body length); the codec turns a
//! body into a [`Message`] for a given command and back.

use bytes::{BufMut, Bytes, BytesMut};

use super::commands::MessageCommand;
use super::inventory::{InventoryVector, INVENTORY_ENTRY_SIZE};
use super::io::{put_var_int, PayloadReader};
use super::message::Message;
use super::payloads::{AddressEntry, BlockPayload, TxPayload, ADDRESS_ENTRY_SIZE};
use super::version_payload::VersionPayload;
use crate::error::CodecError;

/// Encodes and decodes message bodies
pub trait MessageCodec {
    /// Appends the body of `message` to `dst`.
    fn encode_payload(&self, message: &Message, dst: &mut BytesMut);

    /// Decodes a body for `command`.
    ///
    /// Unrecognised commands decode to [`Message::Unknown`], never to an error.
    fn decode_payload(&self, command: MessageCommand, payload: &[u8]) -> Result<Message, CodecError>;
}

/// The standard wire encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec;

impl MessageCodec for WireCodec {
    fn encode_payload(&self, message: &Message, dst: &mut BytesMut) {
        match message {
            Message::Version(version) => version.encode(dst),
            Message::Verack | Message::GetAddr => {}
            Message::Addr(entries) => {
                put_var_int(dst, entries.len() as u64);
                for entry in entries {
                    entry.encode(dst);
                }
            }
            Message::Inv(items) | Message::GetData(items) | Message::NotFound(items) => {
                encode_inventory(items, dst)
            }
            Message::Block(block) => block.encode(dst),
            Message::Tx(tx) => dst.put_slice(&tx.raw),
            Message::Ping(nonce) => {
                if let Some(nonce) = nonce {
                    dst.put_u64_le(*nonce);
                }
            }
            Message::Pong(nonce) => dst.put_u64_le(*nonce),
            Message::Unknown { payload, .. } => dst.put_slice(payload),
        }
    }

    fn decode_payload(&self, command: MessageCommand, payload: &[u8]) -> Result<Message, CodecError> {
        let mut reader = PayloadReader::new(payload);
        let message = match command {
            MessageCommand::VERSION => {
                // Trailing extension fields are tolerated, see VersionPayload::decode
                return VersionPayload::decode(&mut reader).map(Message::Version);
            }
            MessageCommand::VERACK => Message::Verack,
            MessageCommand::GETADDR => Message::GetAddr,
            MessageCommand::ADDR => {
                let count = reader.read_count(ADDRESS_ENTRY_SIZE)?;
                let entries = (0..count)
                    .map(|_| AddressEntry::decode(&mut reader))
                    .collect::<Result<Vec<_>, _>>()?;
                Message::Addr(entries)
            }
            MessageCommand::INV => Message::Inv(decode_inventory(&mut reader)?),
            MessageCommand::GETDATA => Message::GetData(decode_inventory(&mut reader)?),
            MessageCommand::NOTFOUND => Message::NotFound(decode_inventory(&mut reader)?),
            MessageCommand::BLOCK => Message::Block(BlockPayload::decode(&mut reader)?),
            MessageCommand::TX => Message::Tx(TxPayload::decode(&mut reader)?),
            MessageCommand::PING => {
                if reader.is_empty() {
                    Message::Ping(None)
                } else {
                    Message::Ping(Some(reader.read_u64()?))
                }
            }
            MessageCommand::PONG => Message::Pong(reader.read_u64()?),
            command => {
                return Ok(Message::Unknown {
                    command,
                    payload: Bytes::copy_from_slice(payload),
                })
            }
        };
        reader.finish()?;
        Ok(message)
    }
}

fn encode_inventory(items: &[InventoryVector], dst: &mut BytesMut) {
    put_var_int(dst, items.len() as u64);
    for item in items {
        item.encode(dst);
    }
}

fn decode_inventory(reader: &mut PayloadReader<'_>) -> Result<Vec<InventoryVector>, CodecError> {
    let count = reader.read_count(INVENTORY_ENTRY_SIZE)?;
    (0..count).map(|_| InventoryVector::decode(&mut *reader)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Hash256, NetAddress};

    fn encode(message: &Message) -> BytesMut {
        let mut buf = BytesMut::new();
        WireCodec.encode_payload(message, &mut buf);
        buf
    }

    #[test]
    fn test_inv_layout() {
        let iv = InventoryVector::block(Hash256::new([9u8; 32]));
        let buf = encode(&Message::Inv(vec![iv]));

        assert_eq!(buf.len(), 1 + INVENTORY_ENTRY_SIZE);
        assert_eq!(buf[0], 1);
        assert_eq!(&buf[1..5], &2u32.to_le_bytes());

        let decoded = WireCodec.decode_payload(MessageCommand::INV, &buf).unwrap();
        assert_eq!(decoded, Message::Inv(vec![iv]));
    }

    #[test]
    fn test_addr_payload() {
        let entry = AddressEntry::new(
            1_700_000_000,
            NetAddress::new(1, "10.0.0.1:8333".parse().unwrap()),
        );
        let message = Message::Addr(vec![entry, entry]);
        let buf = encode(&message);
        assert_eq!(WireCodec.decode_payload(MessageCommand::ADDR, &buf).unwrap(), message);
    }

    #[test]
    fn test_empty_bodies() {
        assert_eq!(
            WireCodec.decode_payload(MessageCommand::VERACK, &[]).unwrap(),
            Message::Verack
        );
        assert_eq!(
            WireCodec.decode_payload(MessageCommand::PING, &[]).unwrap(),
            Message::Ping(None)
        );
        assert_eq!(
            WireCodec.decode_payload(MessageCommand::VERACK, &[0]),
            Err(CodecError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_truncated_inventory_is_error() {
        let mut buf = encode(&Message::GetData(vec![InventoryVector::transaction(Hash256::zero())]));
        buf.truncate(buf.len() - 1);
        assert!(WireCodec.decode_payload(MessageCommand::GETDATA, &buf).is_err());
    }

    #[test]
    fn test_unknown_command_passes_through() {
        let command = MessageCommand::new("sendheaders");
        let decoded = WireCodec.decode_payload(command, &[1, 2, 3]).unwrap();
        assert_eq!(
            decoded,
            Message::Unknown {
                command,
                payload: Bytes::from_static(&[1, 2, 3])
            }
        );
        assert_eq!(decoded.command(), command);
    }
}
