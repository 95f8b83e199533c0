//! Cache domain: tracked entries and the two cache shapes.

mod data_cache;
mod errors;
mod meta_cache;
mod track_state;

pub use data_cache::{CacheKey, CacheSource, CacheValue, DataCache};
pub use errors::{CacheError, CacheResult};
pub use meta_cache::{MetaDataCache, MetaSource};
pub use track_state::TrackState;
