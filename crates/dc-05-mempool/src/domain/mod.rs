//! Pool bookkeeping without any ledger access.

pub mod errors;
pub mod pool;

pub use errors::{MempoolError, MempoolResult};
pub use pool::{fee_per_byte, PoolEntry, TransactionPool};
