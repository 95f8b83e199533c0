//! # Transaction Pool
//!
//! Verified transactions by hash, plus a priority index used for eviction
//! and block packing.
//!
//! Priority is network fee per byte. Equal rates are ordered by the hash
//! read as a little-endian two's-complement integer, so eviction is
//! deterministic across nodes: the smallest integer goes first.

use dc_02_ledger::Transaction;
use num_bigint::BigInt;
use shared_types::{Fixed8, Serializable, UInt256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Network fee divided by encoded size, truncated.
pub fn fee_per_byte(network_fee: Fixed8, size: usize) -> Fixed8 {
    match i64::try_from(size) {
        Ok(size) if size > 0 => Fixed8::from_raw(network_fee.raw() / size),
        _ => Fixed8::ZERO,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Priority {
    fee_per_byte: Fixed8,
    tiebreak: BigInt,
}

impl Priority {
    fn of(fee_per_byte: Fixed8, hash: &UInt256) -> Self {
        Self {
            fee_per_byte,
            tiebreak: BigInt::from_signed_bytes_le(hash.as_bytes()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub transaction: Arc<Transaction>,
    pub network_fee: Fixed8,
    pub size: usize,
    pub fee_per_byte: Fixed8,
}

impl PoolEntry {
    pub fn new(transaction: Arc<Transaction>, network_fee: Fixed8) -> Self {
        let size = transaction.size();
        Self {
            fee_per_byte: fee_per_byte(network_fee, size),
            transaction,
            network_fee,
            size,
        }
    }

    pub fn hash(&self) -> UInt256 {
        self.transaction.hash()
    }
}

#[derive(Debug)]
pub struct TransactionPool {
    capacity: usize,
    by_hash: HashMap<UInt256, PoolEntry>,
    by_priority: BTreeMap<Priority, UInt256>,
}

impl TransactionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            by_hash: HashMap::new(),
            by_priority: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn contains(&self, hash: &UInt256) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &UInt256) -> Option<&PoolEntry> {
        self.by_hash.get(hash)
    }

    /// Add `entry`, then evict the lowest priority entries until the pool
    /// fits its capacity. Returns the evicted hashes, which may include
    /// `entry` itself. An entry already present is left untouched.
    pub fn insert(&mut self, entry: PoolEntry) -> Vec<UInt256> {
        let hash = entry.hash();
        if self.by_hash.contains_key(&hash) {
            return Vec::new();
        }
        self.by_priority
            .insert(Priority::of(entry.fee_per_byte, &hash), hash);
        self.by_hash.insert(hash, entry);

        let mut evicted = Vec::new();
        while self.by_hash.len() > self.capacity {
            let Some((_, lowest)) = self.by_priority.pop_first() else {
                break;
            };
            self.by_hash.remove(&lowest);
            evicted.push(lowest);
        }
        evicted
    }

    pub fn remove(&mut self, hash: &UInt256) -> Option<PoolEntry> {
        let entry = self.by_hash.remove(hash)?;
        self.by_priority
            .remove(&Priority::of(entry.fee_per_byte, hash));
        Some(entry)
    }

    /// Drop every entry `predicate` selects; returns how many went.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&PoolEntry) -> bool,
    {
        let doomed: Vec<UInt256> = self
            .by_hash
            .values()
            .filter(|entry| predicate(entry))
            .map(PoolEntry::hash)
            .collect();
        for hash in &doomed {
            self.remove(hash);
        }
        doomed.len()
    }

    /// Empty the pool, returning its transactions.
    pub fn drain(&mut self) -> Vec<Arc<Transaction>> {
        self.by_priority.clear();
        self.by_hash
            .drain()
            .map(|(_, entry)| entry.transaction)
            .collect()
    }

    pub fn hashes(&self) -> Vec<UInt256> {
        self.by_hash.keys().copied().collect()
    }

    /// Entries in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &PoolEntry> {
        self.by_hash.values()
    }

    /// Entries from highest priority to lowest.
    pub fn by_priority(&self) -> impl Iterator<Item = &PoolEntry> {
        self.by_priority
            .values()
            .rev()
            .filter_map(|hash| self.by_hash.get(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(nonce: u32, fee_raw: i64) -> PoolEntry {
        PoolEntry::new(
            Arc::new(Transaction::miner(nonce, Vec::new())),
            Fixed8::from_raw(fee_raw),
        )
    }

    fn as_integer(hash: &UInt256) -> BigInt {
        BigInt::from_signed_bytes_le(hash.as_bytes())
    }

    #[test]
    fn test_fee_per_byte_truncates() {
        assert_eq!(fee_per_byte(Fixed8::from_raw(100), 30), Fixed8::from_raw(3));
        assert_eq!(fee_per_byte(Fixed8::from_raw(100), 0), Fixed8::ZERO);
    }

    #[test]
    fn test_insert_and_remove() {
        let mut pool = TransactionPool::new(10);
        let a = entry(1, 1000);
        let hash = a.hash();
        assert!(pool.insert(a.clone()).is_empty());
        assert!(pool.insert(a).is_empty());
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&hash));

        assert!(pool.remove(&hash).is_some());
        assert!(pool.remove(&hash).is_none());
        assert!(pool.is_empty());
        assert_eq!(pool.by_priority().count(), 0);
    }

    #[test]
    fn test_eviction_removes_lowest_fee_per_byte() {
        let mut pool = TransactionPool::new(3);
        let entries = [entry(1, 5_000), entry(2, 100), entry(3, 9_000)];
        for e in &entries {
            assert!(pool.insert(e.clone()).is_empty());
        }

        let incoming = entry(4, 2_000);
        let evicted = pool.insert(incoming.clone());
        assert_eq!(evicted, vec![entries[1].hash()]);
        assert_eq!(pool.len(), 3);
        assert!(pool.contains(&incoming.hash()));
    }

    #[test]
    fn test_eviction_tie_goes_to_smallest_signed_hash() {
        let mut pool = TransactionPool::new(3);
        let tied: Vec<PoolEntry> = (10..14).map(|nonce| entry(nonce, 700)).collect();
        let mut evicted = Vec::new();
        for e in &tied {
            evicted.extend(pool.insert(e.clone()));
        }
        // miner transactions of equal size, so every rate is the same
        let expected = tied
            .iter()
            .map(PoolEntry::hash)
            .min_by_key(as_integer)
            .unwrap();
        assert_eq!(evicted, vec![expected]);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_new_entry_can_be_outbid_at_once() {
        let mut pool = TransactionPool::new(1);
        pool.insert(entry(1, 10_000));
        let cheap = entry(2, 1);
        assert_eq!(pool.insert(cheap.clone()), vec![cheap.hash()]);
        assert!(!pool.contains(&cheap.hash()));
    }

    #[test]
    fn test_priority_order_is_descending() {
        let mut pool = TransactionPool::new(10);
        for (nonce, fee) in [(1, 300), (2, 9_000), (3, 4_000)] {
            pool.insert(entry(nonce, fee));
        }
        let fees: Vec<i64> = pool.by_priority().map(|e| e.network_fee.raw()).collect();
        assert_eq!(fees, vec![9_000, 4_000, 300]);
    }

    #[test]
    fn test_remove_where_and_drain() {
        let mut pool = TransactionPool::new(10);
        for nonce in 0..6 {
            pool.insert(entry(nonce, i64::from(nonce) * 1_000));
        }
        assert_eq!(pool.remove_where(|e| e.network_fee.raw() < 3_000), 3);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.drain().len(), 3);
        assert!(pool.is_empty());
        assert_eq!(pool.by_priority().count(), 0);
    }

    proptest! {
        #[test]
        fn test_survivors_outrank_evicted(fees in prop::collection::vec(0i64..50_000, 1..40), capacity in 1usize..10) {
            let mut pool = TransactionPool::new(capacity);
            let mut evicted = Vec::new();
            for (nonce, fee) in fees.iter().enumerate() {
                evicted.extend(pool.insert(entry(nonce as u32, *fee)));
            }
            prop_assert_eq!(pool.len(), fees.len().min(capacity));
            prop_assert_eq!(evicted.len(), fees.len().saturating_sub(capacity));

            let rank = |e: &PoolEntry| Priority::of(e.fee_per_byte, &e.hash());
            let weakest_kept = pool.entries().map(rank).min();
            for hash in &evicted {
                let gone = entry_for(&fees, hash);
                if let Some(kept) = &weakest_kept {
                    prop_assert!(rank(&gone) < *kept);
                }
            }
        }
    }

    fn entry_for(fees: &[i64], hash: &UInt256) -> PoolEntry {
        fees.iter()
            .enumerate()
            .map(|(nonce, fee)| entry(nonce as u32, *fee))
            .find(|e| e.hash() == *hash)
            .unwrap()
    }
}
