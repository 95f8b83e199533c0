//! # dc-02-ledger
//!
//! Blocks, transactions, chain state and the persist pipeline.
//!
//! ## Layout
//!
//! | Module | Role |
//! |--------|------|
//! | `domain` | Wire/storage records, Merkle tree, genesis, validator election |
//! | `snapshot` | One state-cache view per record prefix plus chain queries |
//! | `verification` | Transaction and block rules that need chain state |
//! | `persist` | How a block changes coins, balances and votes |
//! | `service` | [`Blockchain`]: header index, block admission, persistence |
//! | `ports` | Witness verification, contract execution and policy seams |
//!
//! ## Storage prefixes
//!
//! | Prefix | Record |
//! |--------|--------|
//! | `0x01` | `BlockState` by block hash |
//! | `0x02` | `TransactionState` by transaction hash |
//! | `0x40` | `AccountState` by script hash |
//! | `0x44` | `UnspentCoinState` by transaction hash |
//! | `0x45` | `SpentCoinState` by transaction hash |
//! | `0x48` | `ValidatorState` by public key |
//! | `0x4c` | `AssetState` by asset id |
//! | `0x50` | `ContractState` by script hash |
//! | `0x70` | `StorageItem` by `StorageKey` |
//! | `0x80` | `HeaderHashList` by starting height |
//! | `0x90` | `ValidatorsCountState` |
//! | `0xc0` | current block |
//! | `0xc1` | current header |

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod domain;
pub mod header_index;
pub mod persist;
pub mod ports;
pub mod service;
pub mod snapshot;
pub mod verification;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{ProtocolSettings, GENERATION_AMOUNT};
pub use domain::*;
pub use header_index::HeaderIndex;
pub use ports::{AcceptAllPolicy, ContractExecutor, PolicyPlugin, WitnessVerifier};
pub use service::{AddBlockResult, Blockchain, LedgerEvent};
pub use snapshot::{SpentCoin, Snapshot};
pub use verification::calculate_net_fee;
