pub mod contract;
pub mod engine;
pub mod errors;
pub mod interop;
pub mod prices;
pub mod stack;
pub mod stack_item;

pub use contract::{Contract, ContractParameterType};
pub use engine::{ApplicationEngine, ExecutionResult, TriggerType, VmState, MAX_INVOCATION_DEPTH};
pub use errors::{VerificationError, VerificationResult, VmError, VmResult};
pub use stack::EvaluationStack;
pub use stack_item::{StackItem, StorageContext};
