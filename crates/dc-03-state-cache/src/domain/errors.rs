use shared_types::FormatError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Key already exists: {0}")]
    Duplicate(String),

    #[error("Corrupt record: {0}")]
    Format(#[from] FormatError),

    #[error("Store error: {0}")]
    Store(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
