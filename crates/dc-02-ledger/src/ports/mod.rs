//! # Ports
//!
//! Script execution lives in its own crate that depends on this one, so the
//! ledger reaches it through the driven ports in [`outbound`].

pub mod outbound;

pub use outbound::{AcceptAllPolicy, ContractExecutor, PolicyPlugin, WitnessVerifier};
