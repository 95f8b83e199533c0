use dc_02_ledger::LedgerError;
use dc_03_state_cache::CacheError;
use shared_types::UInt160;
use thiserror::Error;

/// Why a script stopped in the `Fault` state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Stack overflow")]
    StackOverflow,

    #[error("Invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),

    #[error("Script ends inside the instruction at {0}")]
    TruncatedScript(usize),

    #[error("Jump target {0} is outside the script")]
    InvalidJump(i64),

    #[error("Gas limit exceeded")]
    OutOfGas,

    #[error("Item of {0} bytes exceeds the size limit")]
    ItemTooLarge(usize),

    #[error("Integer exceeds 32 bytes")]
    IntegerTooLarge,

    #[error("Expected a {0} on the stack")]
    WrongType(&'static str),

    #[error("Multisig needs 1 <= m <= n <= 1024 keys")]
    InvalidMultisig,

    #[error("Invocation depth exceeded")]
    DepthExceeded,

    #[error("Unknown interop service {0:?}")]
    UnknownSyscall(String),

    #[error("Contract {0} does not exist")]
    UnknownContract(UInt160),

    #[error("Storage access denied: {0}")]
    StorageDenied(&'static str),

    #[error("Script threw")]
    Throw,

    #[error("Ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("State cache: {0}")]
    Cache(#[from] CacheError),
}

pub type VmResult<T> = Result<T, VmError>;

/// Why a verifiable object's witnesses were rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("Expected {expected} witnesses, found {actual}")]
    WitnessCount { expected: usize, actual: usize },

    #[error("Verification script does not hash to {expected}")]
    ScriptHashMismatch { expected: UInt160 },

    #[error("Witness for {script_hash} faulted: {source}")]
    Fault { script_hash: UInt160, source: VmError },

    #[error("Witness for {script_hash} left {items} items on the stack")]
    StackShape { script_hash: UInt160, items: usize },

    #[error("Witness for {0} returned false")]
    Rejected(UInt160),

    #[error("Script hashes unavailable: {0}")]
    Ledger(#[from] LedgerError),
}

pub type VerificationResult<T> = Result<T, VerificationError>;
