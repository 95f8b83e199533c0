use crate::domain::CacheResult;
use crate::ports::{BatchOp, Store, StoreView, WriteBatch};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory ordered store for tests and ephemeral nodes. Views share the
/// table until the next write copies it.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<Arc<Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

fn seek_table(table: &Table, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    table
        .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl StoreView for MemoryStore {
    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn seek(&self, prefix: &[u8]) -> CacheResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(seek_table(&self.data.read(), prefix))
    }
}

impl Store for MemoryStore {
    fn snapshot(&self) -> Arc<dyn StoreView> {
        Arc::new(FrozenTable(Arc::clone(&self.data.read())))
    }

    fn write(&self, batch: WriteBatch) -> CacheResult<()> {
        let mut guard = self.data.write();
        let data = Arc::make_mut(&mut guard);
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(k, v) => {
                    data.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    data.remove(&k);
                }
            }
        }
        Ok(())
    }
}

struct FrozenTable(Arc<Table>);

impl StoreView for FrozenTable {
    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.0.get(key).cloned())
    }

    fn seek(&self, prefix: &[u8]) -> CacheResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(seek_table(&self.0, prefix))
    }
}
