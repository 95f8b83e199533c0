//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the ledger requires the host application to provide.

use crate::domain::{Transaction, Verifiable};
use crate::snapshot::Snapshot;

/// Runs the witness scripts of a verifiable item.
///
/// Production: `ScriptWitnessVerifier` in the script verification crate.
pub trait WitnessVerifier: Send + Sync {
    /// True when every witness matches its script hash and its script
    /// halts with `true` on top of the stack.
    fn verify_witnesses(&self, verifiable: &dyn Verifiable, snapshot: &Snapshot) -> bool;
}

/// Executes invocation transactions while a block is persisted.
pub trait ContractExecutor: Send + Sync {
    /// Run `tx` against `snapshot`. Returns true when the engine halted;
    /// the caller discards `snapshot` otherwise.
    fn execute(&self, tx: &Transaction, snapshot: &mut Snapshot) -> bool;
}

/// Node-local admission and packing policy.
pub trait PolicyPlugin: Send + Sync {
    /// False keeps `tx` out of the memory pool.
    fn filter_for_memory_pool(&self, tx: &Transaction) -> bool;

    /// Choose and order the transactions a primary proposes.
    fn filter_for_block(&self, transactions: Vec<Transaction>) -> Vec<Transaction>;
}

/// Policy that admits everything and proposes transactions unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllPolicy;

impl PolicyPlugin for AcceptAllPolicy {
    fn filter_for_memory_pool(&self, _tx: &Transaction) -> bool {
        true
    }

    fn filter_for_block(&self, transactions: Vec<Transaction>) -> Vec<Transaction> {
        transactions
    }
}
