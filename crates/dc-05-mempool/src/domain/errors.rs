use dc_02_ledger::LedgerError;
use shared_types::UInt256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MempoolError {
    #[error("Transaction {0} is already pooled")]
    AlreadyPooled(UInt256),

    #[error("Transaction {0} is already on chain")]
    AlreadyOnChain(UInt256),

    #[error("Miner transaction {0} cannot be pooled")]
    NotPoolable(UInt256),

    #[error("Transaction {0} refused by policy")]
    PolicyRejected(UInt256),

    #[error("Transaction {0} failed verification")]
    VerificationFailed(UInt256),

    /// Admitted, then evicted at once as the lowest priority entry.
    #[error("Transaction {0} pays less per byte than every pooled transaction")]
    Outbid(UInt256),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type MempoolResult<T> = Result<T, MempoolError>;
