//! Relayable objects as the network handles them.

use dc_02_ledger::{Block, ConsensusPayload, Inventory, InventoryType, Transaction};
use shared_types::UInt256;
use std::collections::VecDeque;

pub const RELAY_CACHE_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum InventoryItem {
    Transaction(Transaction),
    Block(Block),
    Consensus(ConsensusPayload),
}

impl InventoryItem {
    pub fn hash(&self) -> UInt256 {
        match self {
            Self::Transaction(tx) => tx.hash(),
            Self::Block(block) => block.hash(),
            Self::Consensus(payload) => payload.hash(),
        }
    }

    pub fn inventory_type(&self) -> InventoryType {
        match self {
            Self::Transaction(tx) => tx.inventory_type(),
            Self::Block(block) => block.inventory_type(),
            Self::Consensus(payload) => payload.inventory_type(),
        }
    }
}

impl From<Transaction> for InventoryItem {
    fn from(tx: Transaction) -> Self {
        Self::Transaction(tx)
    }
}

impl From<Block> for InventoryItem {
    fn from(block: Block) -> Self {
        Self::Block(block)
    }
}

impl From<ConsensusPayload> for InventoryItem {
    fn from(payload: ConsensusPayload) -> Self {
        Self::Consensus(payload)
    }
}

/// The most recently relayed items, served to `getdata` before the ledger
/// or pool is consulted. Consensus payloads live nowhere else.
#[derive(Debug)]
pub struct RelayCache {
    capacity: usize,
    items: VecDeque<InventoryItem>,
}

impl RelayCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, item: InventoryItem) {
        let hash = item.hash();
        self.items.retain(|cached| cached.hash() != hash);
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn get(&self, hash: &UInt256) -> Option<&InventoryItem> {
        self.items.iter().rev().find(|item| item.hash() == *hash)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for RelayCache {
    fn default() -> Self {
        Self::new(RELAY_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(nonce: u32) -> InventoryItem {
        Transaction::miner(nonce, Vec::new()).into()
    }

    #[test]
    fn test_oldest_item_falls_out() {
        let mut cache = RelayCache::new(2);
        let (a, b, c) = (tx(1), tx(2), tx(3));
        cache.add(a.clone());
        cache.add(b.clone());
        cache.add(c.clone());
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a.hash()).is_none());
        assert_eq!(cache.get(&c.hash()), Some(&c));
    }

    #[test]
    fn test_re_adding_refreshes_position() {
        let mut cache = RelayCache::new(2);
        let (a, b, c) = (tx(1), tx(2), tx(3));
        cache.add(a.clone());
        cache.add(b.clone());
        cache.add(a.clone());
        cache.add(c);
        assert!(cache.get(&a.hash()).is_some());
        assert!(cache.get(&b.hash()).is_none());
    }

    #[test]
    fn test_item_type_tags() {
        assert_eq!(tx(1).inventory_type(), InventoryType::Transaction);
    }
}
