//! Ordered key-value store port.
//!
//! Keys are `prefix || serialized key`. A store hands out point-in-time
//! views and applies batches atomically.

use crate::domain::CacheResult;
use std::sync::Arc;

/// Read-only, point-in-time view.
pub trait StoreView: Send + Sync {
    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>>;

    /// All pairs whose key starts with `prefix`, in ascending key order.
    fn seek(&self, prefix: &[u8]) -> CacheResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Writable store.
pub trait Store: StoreView {
    /// Consistent view isolated from later writes.
    fn snapshot(&self) -> Arc<dyn StoreView>;

    /// Apply every operation or none.
    fn write(&self, batch: WriteBatch) -> CacheResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Ordered list of puts and deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}
