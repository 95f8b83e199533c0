//! # dc-05-mempool
//!
//! Unconfirmed transactions waiting for a block.
//!
//! ## Architecture
//!
//! - **Domain** (`domain/`): [`TransactionPool`], a hash index plus a
//!   fee-per-byte priority index that decides eviction
//! - **Service** (`service.rs`): [`MemoryPool`], which verifies against the
//!   ledger, stages peer transactions for parallel batch verification and
//!   follows block persists
//! - **Adapters** (`adapters/`): [`FeePolicy`], the ledger's `PolicyPlugin`
//!   port for admission and block packing
//!
//! ## Eviction
//!
//! Past capacity the entry with the lowest network fee per byte goes first.
//! Ties go to the hash with the smallest value as a signed little-endian
//! integer.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod service;

#[cfg(test)]
pub(crate) mod test_utils;

pub use adapters::FeePolicy;
pub use config::MempoolConfig;
pub use domain::{fee_per_byte, MempoolError, MempoolResult, PoolEntry, TransactionPool};
pub use service::{BatchOutcome, MemoryPool, MempoolEvent};
