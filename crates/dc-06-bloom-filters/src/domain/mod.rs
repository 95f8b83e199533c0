pub mod bloom_filter;
pub mod errors;
pub mod hash_functions;
pub mod matching;

pub use bloom_filter::{BloomFilter, MAX_ELEMENT_SIZE, MAX_FILTER_SIZE, MAX_HASH_FUNCTIONS};
pub use errors::{FilterError, FilterResult};
pub use matching::{match_flags, test_transaction};
