//! Keyed copy-on-write cache.
//!
//! A `DataCache` sits over a [`CacheSource`]: either a store view restricted
//! to one record prefix (`DataCache::db`) or a frozen copy of a parent cache
//! (`create_snapshot`). Reads fall through; writes stay in the local
//! dictionary until `merge` (into a parent cache) or `commit_to` (into a
//! store batch).

use super::errors::{CacheError, CacheResult};
use super::track_state::TrackState;
use crate::ports::{StoreView, WriteBatch};
use shared_types::Serializable;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

pub trait CacheKey: Serializable + Ord + Clone + Debug + Send + Sync + 'static {}
impl<T: Serializable + Ord + Clone + Debug + Send + Sync + 'static> CacheKey for T {}

pub trait CacheValue: Serializable + Clone + Send + Sync + 'static {}
impl<T: Serializable + Clone + Send + Sync + 'static> CacheValue for T {}

/// Where a cache reads entries it has not touched.
pub trait CacheSource<K, V>: Send + Sync {
    fn try_get(&self, key: &K) -> CacheResult<Option<V>>;

    /// Entries whose serialized key starts with `key_prefix`.
    fn find(&self, key_prefix: &[u8]) -> CacheResult<Vec<(K, V)>>;
}

#[derive(Debug, Clone)]
struct Trackable<V> {
    item: V,
    state: TrackState,
}

pub struct DataCache<K: CacheKey, V: CacheValue> {
    source: Arc<dyn CacheSource<K, V>>,
    dictionary: BTreeMap<K, Trackable<V>>,
}

impl<K: CacheKey, V: CacheValue> DataCache<K, V> {
    pub fn new(source: Arc<dyn CacheSource<K, V>>) -> Self {
        Self {
            source,
            dictionary: BTreeMap::new(),
        }
    }

    /// Cache over the records stored under `prefix` in `view`.
    pub fn db(view: Arc<dyn StoreView>, prefix: u8) -> Self {
        Self::new(Arc::new(DbSource { view, prefix }))
    }

    pub fn try_get(&self, key: &K) -> CacheResult<Option<V>> {
        match self.dictionary.get(key) {
            Some(t) if t.state == TrackState::Deleted => Ok(None),
            Some(t) => Ok(Some(t.item.clone())),
            None => self.source.try_get(key),
        }
    }

    pub fn get(&self, key: &K) -> CacheResult<V> {
        self.try_get(key)?
            .ok_or_else(|| CacheError::NotFound(format!("{key:?}")))
    }

    pub fn contains(&self, key: &K) -> CacheResult<bool> {
        Ok(self.try_get(key)?.is_some())
    }

    /// Insert a new entry. Fails if the key is live in this layer.
    pub fn add(&mut self, key: K, value: V) -> CacheResult<()> {
        let state = match self.dictionary.get(&key) {
            Some(t) if t.state != TrackState::Deleted => {
                return Err(CacheError::Duplicate(format!("{key:?}")))
            }
            Some(_) => TrackState::Changed,
            None => TrackState::Added,
        };
        self.dictionary.insert(key, Trackable { item: value, state });
        Ok(())
    }

    /// Insert or overwrite.
    pub fn put(&mut self, key: K, value: V) -> CacheResult<()> {
        if self.contains(&key)? {
            *self.get_and_change(&key)? = value;
            Ok(())
        } else {
            self.add(key, value)
        }
    }

    pub fn delete(&mut self, key: &K) -> CacheResult<()> {
        if let Some(t) = self.dictionary.get_mut(key) {
            if t.state == TrackState::Added {
                self.dictionary.remove(key);
            } else {
                t.state = TrackState::Deleted;
            }
            return Ok(());
        }
        if let Some(item) = self.source.try_get(key)? {
            self.dictionary.insert(
                key.clone(),
                Trackable {
                    item,
                    state: TrackState::Deleted,
                },
            );
        }
        Ok(())
    }

    /// Mutable access to an existing entry, marking it changed.
    pub fn get_and_change(&mut self, key: &K) -> CacheResult<&mut V> {
        self.get_and_change_with(key, None::<fn() -> V>)
    }

    /// Mutable access, creating the entry with `factory` if absent.
    pub fn get_and_change_or<F: FnOnce() -> V>(&mut self, key: &K, factory: F) -> CacheResult<&mut V> {
        self.get_and_change_with(key, Some(factory))
    }

    fn get_and_change_with<F: FnOnce() -> V>(
        &mut self,
        key: &K,
        factory: Option<F>,
    ) -> CacheResult<&mut V> {
        if !self.dictionary.contains_key(key) {
            let trackable = match self.source.try_get(key)? {
                Some(item) => Trackable {
                    item,
                    state: TrackState::Changed,
                },
                None => {
                    let factory =
                        factory.ok_or_else(|| CacheError::NotFound(format!("{key:?}")))?;
                    Trackable {
                        item: factory(),
                        state: TrackState::Added,
                    }
                }
            };
            self.dictionary.insert(key.clone(), trackable);
        } else if let Some(t) = self.dictionary.get_mut(key) {
            match t.state {
                TrackState::Deleted => {
                    let factory =
                        factory.ok_or_else(|| CacheError::NotFound(format!("{key:?}")))?;
                    t.item = factory();
                    t.state = TrackState::Changed;
                }
                TrackState::None => t.state = TrackState::Changed,
                TrackState::Added | TrackState::Changed => {}
            }
        }
        self.dictionary
            .get_mut(key)
            .map(|t| &mut t.item)
            .ok_or_else(|| CacheError::NotFound(format!("{key:?}")))
    }

    /// Existing value, or `factory()` inserted as a new entry.
    pub fn get_or_add<F: FnOnce() -> V>(&mut self, key: K, factory: F) -> CacheResult<V> {
        if let Some(value) = self.try_get(&key)? {
            return Ok(value);
        }
        let value = factory();
        self.add(key, value.clone())?;
        Ok(value)
    }

    /// Live entries whose serialized key starts with `key_prefix`, ordered by key.
    pub fn find(&self, key_prefix: &[u8]) -> CacheResult<Vec<(K, V)>> {
        let mut merged: BTreeMap<K, V> = self
            .source
            .find(key_prefix)?
            .into_iter()
            .filter(|(k, _)| !self.dictionary.contains_key(k))
            .collect();
        for (k, t) in &self.dictionary {
            if t.state != TrackState::Deleted && k.to_array().starts_with(key_prefix) {
                merged.insert(k.clone(), t.item.clone());
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Tracked entries that differ from the source.
    pub fn changes(&self) -> impl Iterator<Item = (&K, &V, TrackState)> {
        self.dictionary
            .iter()
            .filter(|(_, t)| t.state != TrackState::None)
            .map(|(k, t)| (k, &t.item, t.state))
    }

    pub fn has_changes(&self) -> bool {
        self.changes().next().is_some()
    }

    /// Isolated overlay reading through the current contents of this cache.
    pub fn create_snapshot(&self) -> Self {
        Self::new(Arc::new(CloneSource {
            base: Arc::clone(&self.source),
            entries: self.dictionary.clone(),
        }))
    }

    /// Apply a snapshot's tracked changes to this cache.
    pub fn merge(&mut self, snapshot: Self) -> CacheResult<()> {
        for (key, trackable) in snapshot.dictionary {
            match trackable.state {
                TrackState::Added | TrackState::Changed => self.put(key, trackable.item)?,
                TrackState::Deleted => self.delete(&key)?,
                TrackState::None => {}
            }
        }
        Ok(())
    }

    /// Append tracked changes to `batch` under the record `prefix`.
    pub fn commit_to(&self, prefix: u8, batch: &mut WriteBatch) {
        for (key, item, state) in self.changes() {
            let mut raw = Vec::with_capacity(1 + key.size());
            raw.push(prefix);
            raw.extend_from_slice(&key.to_array());
            match state {
                TrackState::Added | TrackState::Changed => batch.put(raw, item.to_array()),
                TrackState::Deleted => batch.delete(raw),
                TrackState::None => {}
            }
        }
    }
}

/// Records under one prefix of a store view.
struct DbSource {
    view: Arc<dyn StoreView>,
    prefix: u8,
}

impl DbSource {
    fn raw_key(&self, key: &[u8]) -> Vec<u8> {
        let mut raw = Vec::with_capacity(1 + key.len());
        raw.push(self.prefix);
        raw.extend_from_slice(key);
        raw
    }
}

impl<K: CacheKey, V: CacheValue> CacheSource<K, V> for DbSource {
    fn try_get(&self, key: &K) -> CacheResult<Option<V>> {
        match self.view.get(&self.raw_key(&key.to_array()))? {
            Some(bytes) => Ok(Some(V::from_array(&bytes)?)),
            None => Ok(None),
        }
    }

    fn find(&self, key_prefix: &[u8]) -> CacheResult<Vec<(K, V)>> {
        self.view
            .seek(&self.raw_key(key_prefix))?
            .into_iter()
            .map(|(k, v)| Ok((K::from_array(&k[1..])?, V::from_array(&v)?)))
            .collect()
    }
}

/// Frozen copy of a parent cache's dictionary over the parent's source.
struct CloneSource<K, V> {
    base: Arc<dyn CacheSource<K, V>>,
    entries: BTreeMap<K, Trackable<V>>,
}

impl<K: CacheKey, V: CacheValue> CacheSource<K, V> for CloneSource<K, V> {
    fn try_get(&self, key: &K) -> CacheResult<Option<V>> {
        match self.entries.get(key) {
            Some(t) if t.state == TrackState::Deleted => Ok(None),
            Some(t) => Ok(Some(t.item.clone())),
            None => self.base.try_get(key),
        }
    }

    fn find(&self, key_prefix: &[u8]) -> CacheResult<Vec<(K, V)>> {
        let mut merged: BTreeMap<K, V> = self
            .base
            .find(key_prefix)?
            .into_iter()
            .filter(|(k, _)| !self.entries.contains_key(k))
            .collect();
        for (k, t) in &self.entries {
            if t.state != TrackState::Deleted && k.to_array().starts_with(key_prefix) {
                merged.insert(k.clone(), t.item.clone());
            }
        }
        Ok(merged.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::ports::Store;
    use shared_types::{BinaryReader, BinaryWriter, FormatError};

    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
    struct Key(Vec<u8>);

    impl Serializable for Key {
        fn size(&self) -> usize {
            shared_types::var_bytes_size(self.0.len())
        }
        fn serialize(&self, writer: &mut BinaryWriter) {
            writer.write_var_bytes(&self.0);
        }
        fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
            Ok(Self(reader.read_var_bytes(64)?))
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Value(u32);

    impl Serializable for Value {
        fn size(&self) -> usize {
            4
        }
        fn serialize(&self, writer: &mut BinaryWriter) {
            writer.write_u32(self.0);
        }
        fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
            Ok(Self(reader.read_u32()?))
        }
    }

    fn k(bytes: &[u8]) -> Key {
        Key(bytes.to_vec())
    }

    const PREFIX: u8 = 0x70;

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut cache: DataCache<Key, Value> = DataCache::db(store.snapshot(), PREFIX);
        cache.add(k(b"a"), Value(1)).unwrap();
        cache.add(k(b"b"), Value(2)).unwrap();
        let mut batch = WriteBatch::new();
        cache.commit_to(PREFIX, &mut batch);
        store.write(batch).unwrap();
        store
    }

    #[test]
    fn test_read_through_and_track_states() {
        let store = seeded_store();
        let mut cache: DataCache<Key, Value> = DataCache::db(store.snapshot(), PREFIX);
        assert_eq!(cache.get(&k(b"a")).unwrap(), Value(1));
        assert!(!cache.has_changes());

        cache.get_and_change(&k(b"a")).unwrap().0 = 10;
        cache.delete(&k(b"b")).unwrap();
        cache.add(k(b"c"), Value(3)).unwrap();

        let states: Vec<_> = cache.changes().map(|(key, _, s)| (key.clone(), s)).collect();
        assert_eq!(
            states,
            vec![
                (k(b"a"), TrackState::Changed),
                (k(b"b"), TrackState::Deleted),
                (k(b"c"), TrackState::Added),
            ]
        );
        assert_eq!(cache.try_get(&k(b"b")).unwrap(), None);
    }

    #[test]
    fn test_add_duplicate_and_readd_after_delete() {
        let mut cache: DataCache<Key, Value> = DataCache::db(seeded_store().snapshot(), PREFIX);
        cache.add(k(b"x"), Value(1)).unwrap();
        assert!(matches!(cache.add(k(b"x"), Value(2)), Err(CacheError::Duplicate(_))));

        cache.delete(&k(b"a")).unwrap();
        cache.add(k(b"a"), Value(7)).unwrap();
        assert_eq!(cache.get(&k(b"a")).unwrap(), Value(7));
        assert!(cache
            .changes()
            .any(|(key, _, s)| key == &k(b"a") && s == TrackState::Changed));
    }

    #[test]
    fn test_delete_of_added_entry_forgets_it() {
        let mut cache: DataCache<Key, Value> = DataCache::db(Arc::new(MemoryStore::new()), PREFIX);
        cache.add(k(b"n"), Value(1)).unwrap();
        cache.delete(&k(b"n")).unwrap();
        assert!(!cache.has_changes());
    }

    #[test]
    fn test_get_and_change_factory() {
        let mut cache: DataCache<Key, Value> = DataCache::db(Arc::new(MemoryStore::new()), PREFIX);
        assert!(matches!(cache.get_and_change(&k(b"z")), Err(CacheError::NotFound(_))));
        cache.get_and_change_or(&k(b"z"), || Value(0)).unwrap().0 += 5;
        assert_eq!(cache.get(&k(b"z")).unwrap(), Value(5));
        assert_eq!(cache.get_or_add(k(b"z"), || Value(99)).unwrap(), Value(5));
    }

    #[test]
    fn test_snapshot_invisible_until_merge() {
        let store = seeded_store();
        let mut parent: DataCache<Key, Value> = DataCache::db(store.snapshot(), PREFIX);
        parent.get_and_change(&k(b"a")).unwrap().0 = 11;

        let mut child = parent.create_snapshot();
        assert_eq!(child.get(&k(b"a")).unwrap(), Value(11));
        child.get_and_change(&k(b"a")).unwrap().0 = 12;
        child.delete(&k(b"b")).unwrap();
        child.add(k(b"d"), Value(4)).unwrap();

        assert_eq!(parent.get(&k(b"a")).unwrap(), Value(11));
        assert_eq!(parent.get(&k(b"b")).unwrap(), Value(2));
        assert_eq!(parent.try_get(&k(b"d")).unwrap(), None);

        parent.merge(child).unwrap();
        assert_eq!(parent.get(&k(b"a")).unwrap(), Value(12));
        assert_eq!(parent.try_get(&k(b"b")).unwrap(), None);
        assert_eq!(parent.get(&k(b"d")).unwrap(), Value(4));

        // nothing reaches the store until commit
        assert_eq!(
            DataCache::<Key, Value>::db(store.snapshot(), PREFIX)
                .get(&k(b"a"))
                .unwrap(),
            Value(1)
        );
        let mut batch = WriteBatch::new();
        parent.commit_to(PREFIX, &mut batch);
        store.write(batch).unwrap();
        let reread: DataCache<Key, Value> = DataCache::db(store.snapshot(), PREFIX);
        assert_eq!(reread.get(&k(b"a")).unwrap(), Value(12));
        assert_eq!(reread.try_get(&k(b"b")).unwrap(), None);
    }

    #[test]
    fn test_dropped_snapshot_discards_changes() {
        let store = seeded_store();
        let parent: DataCache<Key, Value> = DataCache::db(store.snapshot(), PREFIX);
        {
            let mut child = parent.create_snapshot();
            child.delete(&k(b"a")).unwrap();
        }
        assert_eq!(parent.get(&k(b"a")).unwrap(), Value(1));
        assert!(!parent.has_changes());
    }

    #[test]
    fn test_find_merges_layers() {
        let store = seeded_store();
        let mut cache: DataCache<Key, Value> = DataCache::db(store.snapshot(), PREFIX);
        cache.delete(&k(b"a")).unwrap();
        cache.add(k(b"c"), Value(3)).unwrap();
        let child = cache.create_snapshot();
        let found: Vec<_> = child.find(&[]).unwrap().into_iter().map(|(key, _)| key).collect();
        assert_eq!(found, vec![k(b"b"), k(b"c")]);

        // prefix over the serialized key: var-length byte 1 then 'b'
        let found = child.find(&[1, b'b']).unwrap();
        assert_eq!(found, vec![(k(b"b"), Value(2))]);
    }
}
