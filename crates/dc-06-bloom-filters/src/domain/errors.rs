use thiserror::Error;

/// Why a peer-supplied filter or element was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Filter of {size} bytes exceeds {max}")]
    FilterTooLarge { size: usize, max: usize },

    #[error("{count} hash functions exceeds {max}")]
    TooManyHashFunctions { count: usize, max: usize },

    #[error("Element of {size} bytes exceeds {max}")]
    ElementTooLarge { size: usize, max: usize },

    #[error("Filter must have at least one bit")]
    Empty,
}

pub type FilterResult<T> = Result<T, FilterError>;
