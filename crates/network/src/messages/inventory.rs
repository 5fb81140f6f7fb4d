//! Inventory item types.
//!
//! An inventory vector names a transaction or block by type and hash; it is
//! the key used for announcements (`inv`), requests (`getdata`) and request
//! tracking.

use std::fmt;

use bytes::BufMut;
use sha2::{Digest, Sha256};

use super::io::PayloadReader;
use crate::error::CodecError;

/// Size of a serialized inventory entry
pub const INVENTORY_ENTRY_SIZE: usize = 4 + 32;

/// 32-byte object identifier in internal byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Double SHA-256 of `data`
    pub fn double_sha256(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&second);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Displayed byte-reversed, the way block explorers print hashes.
impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&hex::encode(reversed))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self)
    }
}

/// Inventory item types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum InventoryType {
    Transaction = 1,
    Block = 2,
}

impl InventoryType {
    pub fn from_u32(value: u32) -> Result<Self, CodecError> {
        match value {
            1 => Ok(Self::Transaction),
            2 => Ok(Self::Block),
            other => Err(CodecError::InvalidInventoryType(other)),
        }
    }
}

/// Inventory vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InventoryVector {
    /// Item type
    pub item_type: InventoryType,
    /// Item hash
    pub hash: Hash256,
}

impl InventoryVector {
    /// Creates a new inventory vector
    pub fn new(item_type: InventoryType, hash: Hash256) -> Self {
        Self { item_type, hash }
    }

    /// Creates a transaction inventory vector
    pub fn transaction(hash: Hash256) -> Self {
        Self::new(InventoryType::Transaction, hash)
    }

    /// Creates a block inventory vector
    pub fn block(hash: Hash256) -> Self {
        Self::new(InventoryType::Block, hash)
    }

    pub(crate) fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u32_le(self.item_type as u32);
        dst.put_slice(self.hash.as_bytes());
    }

    pub(crate) fn decode(reader: &mut PayloadReader<'_>) -> Result<Self, CodecError> {
        let item_type = InventoryType::from_u32(reader.read_u32()?)?;
        let hash = Hash256::new(reader.read_array()?);
        Ok(Self { item_type, hash })
    }
}

impl fmt::Display for InventoryVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.item_type {
            InventoryType::Transaction => write!(f, "tx {}", self.hash),
            InventoryType::Block => write!(f, "block {}", self.hash),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_inventory_vector() {
        let hash = Hash256::new([7u8; 32]);

        let tx_item = InventoryVector::transaction(hash);
        assert_eq!(tx_item.item_type, InventoryType::Transaction);
        assert_eq!(tx_item.hash, hash);

        let block_item = InventoryVector::block(hash);
        assert_eq!(block_item.item_type, InventoryType::Block);
        assert_ne!(tx_item, block_item);

        // Value equality, not identity
        let set: HashSet<_> = [tx_item, InventoryVector::transaction(Hash256::new([7u8; 32]))]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_hash_display_is_reversed() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        let hash = Hash256::new(bytes);
        assert!(hash.to_string().ends_with("ab"));
        assert!(hash.to_string().starts_with("00"));
    }

    #[test]
    fn test_genesis_header_hash() {
        let header = hex::decode(concat!(
            "0100000000000000000000000000000000000000000000000000000000000000",
            "000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa",
            "4b1e5e4a29ab5f49ffff001d1dac2b7c"
        ))
        .unwrap();
        assert_eq!(
            Hash256::double_sha256(&header).to_string(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
    }

    #[test]
    fn test_unknown_inventory_type() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 32]);
        let mut reader = PayloadReader::new(&buf);
        assert_eq!(
            InventoryVector::decode(&mut reader),
            Err(CodecError::InvalidInventoryType(3))
        );
    }
}
