pub mod ledger;

pub use ledger::{ScriptContractExecutor, ScriptWitnessVerifier};
