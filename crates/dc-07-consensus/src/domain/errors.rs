use dc_02_ledger::LedgerError;
use shared_crypto::CryptoError;
use shared_types::FormatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("Malformed consensus message: {0}")]
    Format(#[from] FormatError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("This node is not a validator for block {0}")]
    NotValidator(u32),

    #[error("No proposal for block {0}")]
    NoProposal(u32),
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;
