//! Single-record cache for metadata singletons (current block pointer,
//! validator vote counts).

use super::data_cache::CacheValue;
use super::errors::CacheResult;
use super::track_state::TrackState;
use crate::ports::{StoreView, WriteBatch};
use std::sync::Arc;

pub trait MetaSource<T>: Send + Sync {
    fn try_get(&self) -> CacheResult<Option<T>>;
}

pub struct MetaDataCache<T: CacheValue> {
    source: Arc<dyn MetaSource<T>>,
    item: Option<T>,
    state: TrackState,
    factory: fn() -> T,
}

impl<T: CacheValue> MetaDataCache<T> {
    /// Singleton stored under the one-byte key `prefix`; `factory` supplies
    /// the value when nothing is stored yet.
    pub fn db(view: Arc<dyn StoreView>, prefix: u8, factory: fn() -> T) -> Self {
        Self {
            source: Arc::new(DbMeta { view, prefix }),
            item: None,
            state: TrackState::None,
            factory,
        }
    }

    pub fn get(&self) -> CacheResult<T> {
        if let Some(item) = &self.item {
            return Ok(item.clone());
        }
        Ok(self.source.try_get()?.unwrap_or_else(self.factory))
    }

    pub fn get_and_change(&mut self) -> CacheResult<&mut T> {
        if self.item.is_none() {
            let (item, state) = match self.source.try_get()? {
                Some(item) => (item, TrackState::Changed),
                None => ((self.factory)(), TrackState::Added),
            };
            self.state = state;
            self.item = Some(item);
        } else if self.state == TrackState::None {
            self.state = TrackState::Changed;
        }
        Ok(self.item.get_or_insert_with(self.factory))
    }

    pub fn is_changed(&self) -> bool {
        matches!(self.state, TrackState::Added | TrackState::Changed)
    }

    pub fn create_snapshot(&self) -> Self {
        Self {
            source: Arc::new(FrozenMeta {
                base: Arc::clone(&self.source),
                item: self.item.clone(),
            }),
            item: None,
            state: TrackState::None,
            factory: self.factory,
        }
    }

    pub fn merge(&mut self, snapshot: Self) -> CacheResult<()> {
        if snapshot.is_changed() {
            if let Some(item) = snapshot.item {
                *self.get_and_change()? = item;
            }
        }
        Ok(())
    }

    pub fn commit_to(&self, prefix: u8, batch: &mut WriteBatch) {
        if let (true, Some(item)) = (self.is_changed(), &self.item) {
            batch.put(vec![prefix], item.to_array());
        }
    }
}

struct DbMeta {
    view: Arc<dyn StoreView>,
    prefix: u8,
}

impl<T: CacheValue> MetaSource<T> for DbMeta {
    fn try_get(&self) -> CacheResult<Option<T>> {
        match self.view.get(&[self.prefix])? {
            Some(bytes) => Ok(Some(T::from_array(&bytes)?)),
            None => Ok(None),
        }
    }
}

struct FrozenMeta<T> {
    base: Arc<dyn MetaSource<T>>,
    item: Option<T>,
}

impl<T: CacheValue> MetaSource<T> for FrozenMeta<T> {
    fn try_get(&self) -> CacheResult<Option<T>> {
        match &self.item {
            Some(item) => Ok(Some(item.clone())),
            None => self.base.try_get(),
        }
    }
}
