//! Decoded protocol messages.

use bytes::Bytes;

use super::commands::MessageCommand;
use super::inventory::InventoryVector;
use super::payloads::{AddressEntry, BlockPayload, TxPayload};
use super::version_payload::VersionPayload;

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionPayload),
    Verack,
    Addr(Vec<AddressEntry>),
    GetAddr,
    Inv(Vec<InventoryVector>),
    GetData(Vec<InventoryVector>),
    NotFound(Vec<InventoryVector>),
    Block(BlockPayload),
    Tx(TxPayload),
    /// Keepalive; the nonce is absent on very old peers
    Ping(Option<u64>),
    Pong(u64),
    /// Command this client does not understand, passed through undecoded
    Unknown {
        command: MessageCommand,
        payload: Bytes,
    },
}

impl Message {
    pub fn command(&self) -> MessageCommand {
        match self {
            Message::Version(_) => MessageCommand::VERSION,
            Message::Verack => MessageCommand::VERACK,
            Message::Addr(_) => MessageCommand::ADDR,
            Message::GetAddr => MessageCommand::GETADDR,
            Message::Inv(_) => MessageCommand::INV,
            Message::GetData(_) => MessageCommand::GETDATA,
            Message::NotFound(_) => MessageCommand::NOTFOUND,
            Message::Block(_) => MessageCommand::BLOCK,
            Message::Tx(_) => MessageCommand::TX,
            Message::Ping(_) => MessageCommand::PING,
            Message::Pong(_) => MessageCommand::PONG,
            Message::Unknown { command, .. } => *command,
        }
    }

    /// Builds a `getdata` for a single item
    pub fn get_data(iv: InventoryVector) -> Self {
        Message::GetData(vec![iv])
    }
}
