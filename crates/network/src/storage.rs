//! Address, block and transaction storage used by the session handlers.

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::trace;

use crate::messages::{AddressEntry, BlockPayload, Hash256, InventoryType, InventoryVector, TxPayload};

/// Storage collaborator of the message handlers
pub trait Storage {
    /// Records addresses advertised by a peer
    fn store_addresses(&mut self, addresses: &[AddressEntry]);

    fn has_transaction(&self, hash: &Hash256) -> bool;

    fn has_block(&self, hash: &Hash256) -> bool;

    /// Hands a received block to protocol processing
    fn process_block(&mut self, block: &BlockPayload);

    /// Hands a received transaction to protocol processing
    fn process_transaction(&mut self, tx: &TxPayload);

    /// Whether the item named by `iv` is already known
    fn contains(&self, iv: &InventoryVector) -> bool {
        match iv.item_type {
            InventoryType::Transaction => self.has_transaction(&iv.hash),
            InventoryType::Block => self.has_block(&iv.hash),
        }
    }
}

/// Keeps everything in memory
#[derive(Debug, Default)]
pub struct MemoryStorage {
    addresses: HashMap<SocketAddr, AddressEntry>,
    blocks: HashMap<Hash256, BlockPayload>,
    transactions: HashMap<Hash256, TxPayload>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address_count(&self) -> usize {
        self.addresses.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn address(&self, address: &SocketAddr) -> Option<&AddressEntry> {
        self.addresses.get(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &AddressEntry> {
        self.addresses.values()
    }

    pub fn block(&self, hash: &Hash256) -> Option<&BlockPayload> {
        self.blocks.get(hash)
    }

    pub fn transaction(&self, hash: &Hash256) -> Option<&TxPayload> {
        self.transactions.get(hash)
    }
}

impl Storage for MemoryStorage {
    fn store_addresses(&mut self, addresses: &[AddressEntry]) {
        for entry in addresses {
            // Keep the most recently seen record of each address
            self.addresses
                .entry(entry.address.socket_addr())
                .and_modify(|known| {
                    if entry.time > known.time {
                        *known = *entry;
                    }
                })
                .or_insert(*entry);
        }
        trace!(count = addresses.len(), total = self.addresses.len(), "stored addresses");
    }

    fn has_transaction(&self, hash: &Hash256) -> bool {
        self.transactions.contains_key(hash)
    }

    fn has_block(&self, hash: &Hash256) -> bool {
        self.blocks.contains_key(hash)
    }

    fn process_block(&mut self, block: &BlockPayload) {
        self.blocks.insert(block.hash(), block.clone());
    }

    fn process_transaction(&mut self, tx: &TxPayload) {
        self.transactions.insert(tx.hash(), tx.clone());
    }
}
