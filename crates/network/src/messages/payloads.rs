//! Address, block and transaction payloads.
//!
//! Block and transaction contents are opaque to the session layer: blocks
//! are split into the 80-byte header (which names the block) and the raw
//! transaction section, transactions are kept as raw bytes.

use bytes::{BufMut, Bytes};

use super::inventory::{Hash256, InventoryVector};
use super::io::PayloadReader;
use super::version_payload::{NetAddress, NET_ADDRESS_SIZE};
use crate::error::CodecError;

/// Size of a timestamped address entry
pub const ADDRESS_ENTRY_SIZE: usize = 4 + NET_ADDRESS_SIZE;

/// Size of a serialized block header
pub const BLOCK_HEADER_SIZE: usize = 80;

/// Address advertised by a peer with its last-seen time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressEntry {
    /// Last-seen time, unix seconds
    pub time: u32,
    pub address: NetAddress,
}

impl AddressEntry {
    pub fn new(time: u32, address: NetAddress) -> Self {
        Self { time, address }
    }

    pub(crate) fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u32_le(self.time);
        self.address.encode(dst);
    }

    pub(crate) fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        let time = reader.read_u32()?;
        let address = NetAddress::decode(reader)?;
        Ok(Self { time, address })
    }
}

/// Block header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut bytes = [0u8; BLOCK_HEADER_SIZE];
        let mut dst = &mut bytes[..];
        dst.put_i32_le(self.version);
        dst.put_slice(self.prev_block.as_bytes());
        dst.put_slice(self.merkle_root.as_bytes());
        dst.put_u32_le(self.time);
        dst.put_u32_le(self.bits);
        dst.put_u32_le(self.nonce);
        bytes
    }

    /// Block hash (double SHA-256 of the serialized header)
    pub fn hash(&self) -> Hash256 {
        Hash256::double_sha256(&self.to_bytes())
    }

    pub(crate) fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            version: reader.read_i32()?,
            prev_block: Hash256::new(reader.read_array()?),
            merkle_root: Hash256::new(reader.read_array()?),
            time: reader.read_u32()?,
            bits: reader.read_u32()?,
            nonce: reader.read_u32()?,
        })
    }
}

/// Block message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPayload {
    pub header: BlockHeader,
    /// Transaction count and transactions, undecoded
    pub transactions: Bytes,
}

impl BlockPayload {
    pub fn new(header: BlockHeader, transactions: impl Into<Bytes>) -> Self {
        Self {
            header,
            transactions: transactions.into(),
        }
    }

    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Inventory vector naming this block
    pub fn inventory(&self) -> InventoryVector {
        InventoryVector::block(self.hash())
    }

    pub(crate) fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.transactions);
    }

    pub(crate) fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        let header = BlockHeader::decode(reader)?;
        let transactions = Bytes::copy_from_slice(reader.read_bytes(reader.remaining())?);
        Ok(Self {
            header,
            transactions,
        })
    }
}

/// Transaction message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPayload {
    pub raw: Bytes,
}

impl TxPayload {
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self { raw: raw.into() }
    }

    /// Transaction hash (double SHA-256 of the serialized transaction)
    pub fn hash(&self) -> Hash256 {
        Hash256::double_sha256(&self.raw)
    }

    /// Inventory vector naming this transaction
    pub fn inventory(&self) -> InventoryVector {
        InventoryVector::transaction(self.hash())
    }

    pub(crate) fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        if reader.is_empty() {
            return Err(CodecError::Truncated {
                needed: 1,
                available: 0,
            });
        }
        let raw = Bytes::copy_from_slice(reader.read_bytes(reader.remaining())?);
        Ok(Self { raw })
    }
}
