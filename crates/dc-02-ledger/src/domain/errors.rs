use dc_03_state_cache::CacheError;
use shared_types::{ArithmeticError, FormatError, UInt256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Malformed record: {0}")]
    Format(#[from] FormatError),

    #[error("State cache: {0}")]
    Cache(#[from] CacheError),

    #[error("Amount arithmetic: {0}")]
    Arithmetic(#[from] ArithmeticError),

    #[error("Unknown transaction {0}")]
    UnknownTransaction(UInt256),

    #[error("Unknown header {0}")]
    UnknownHeader(UInt256),

    #[error("Unknown asset {0}")]
    UnknownAsset(UInt256),

    #[error("Output {hash}:{index} does not exist")]
    MissingOutput { hash: UInt256, index: u16 },

    #[error("Claim is not allowed: {0}")]
    InvalidClaim(String),

    #[error("Invalid validator set: {0}")]
    ValidatorSet(String),

    #[error("Invalid genesis configuration: {0}")]
    Genesis(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
