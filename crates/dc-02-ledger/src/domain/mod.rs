//! Ledger domain: wire and storage records plus the pure rules over them.

pub mod attribute;
pub mod block;
pub mod coin;
pub mod consensus_payload;
pub mod errors;
pub mod genesis;
pub mod inventory;
pub mod merkle;
pub mod state_descriptor;
pub mod states;
pub mod transaction;
pub mod validators;
pub mod witness;

pub use attribute::{AttributeUsage, TransactionAttribute};
pub use block::{Block, Header, TrimmedBlock, MAX_TRANSACTIONS_PER_BLOCK};
pub use coin::{CoinReference, TransactionOutput};
pub use consensus_payload::ConsensusPayload;
pub use errors::{LedgerError, LedgerResult};
pub use inventory::{sign, Inventory, InventoryType, Verifiable};
pub use merkle::MerkleTree;
pub use state_descriptor::{StateDescriptor, StateType, FIELD_REGISTERED, FIELD_VOTES};
pub use states::{
    contract_properties, AccountState, AssetState, AssetType, BlockState, CoinState,
    ContractState, HashIndexState, HeaderHashList, HeightKey, SpentCoinState, StorageItem,
    StorageKey, TransactionState, UnspentCoinState, ValidatorState, ValidatorsCountState,
};
pub use transaction::{
    Transaction, TransactionData, TransactionResult, TransactionType, MAX_TRANSACTION_SIZE,
};
pub use witness::Witness;
