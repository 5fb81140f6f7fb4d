//! Protocol messages and their wire encoding.

pub mod codec;
pub mod commands;
pub mod header;
pub mod inventory;
mod io;
pub mod message;
pub mod payloads;
pub mod version_payload;

pub use codec::{MessageCodec, WireCodec};
pub use commands::MessageCommand;
pub use header::{MessageHeader, HEADER_SIZE, MAGIC_SIZE};
pub use inventory::{Hash256, InventoryType, InventoryVector};
pub use message::Message;
pub use payloads::{AddressEntry, BlockHeader, BlockPayload, TxPayload};
pub use version_payload::{NetAddress, VersionPayload};
