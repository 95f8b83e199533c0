//! # dc-04-script-verification
//!
//! Witness verification and contract execution for the ledger.
//!
//! ## Architecture
//!
//! - **Domain** (`domain/`): the [`ApplicationEngine`] stack machine, its
//!   price table, interop services and the standard [`Contract`] shapes
//! - **Service** (`service.rs`): [`verify_witnesses`], the gate every block,
//!   transaction and consensus payload passes
//! - **Adapters** (`adapters/`): the ledger's `WitnessVerifier` and
//!   `ContractExecutor` ports implemented over the engine
//!
//! ## Supported instructions
//!
//! Pushes, `NOP`, jumps, `RET`, `APPCALL`, `SYSCALL`, the common stack
//! shuffles, `SIZE`/`EQUAL`, small integer arithmetic and comparisons, the
//! hash opcodes, `CHECKSIG`, `VERIFY`, `CHECKMULTISIG` and `THROW`/`THROWIFNOT`.
//! Anything else faults.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod service;

#[cfg(test)]
pub(crate) mod test_utils;

pub use adapters::{ScriptContractExecutor, ScriptWitnessVerifier};
pub use domain::{
    ApplicationEngine, Contract, ContractParameterType, ExecutionResult, StackItem, TriggerType,
    VerificationError, VerificationResult, VmError, VmResult, VmState,
};
pub use service::verify_witnesses;
