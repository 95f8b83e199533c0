//! # Error Types
//!
//! Decoding failures shared by every wire and storage codec.

use thiserror::Error;

/// Malformed bytes or text. Aborts decoding of the single message or record
/// being read; nothing else is affected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Input ended before the value was complete.
    #[error("Unexpected end of data: needed {needed} bytes, {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// A length or count exceeded its limit.
    #[error("Value {value} exceeds limit {max}")]
    LimitExceeded { value: u64, max: u64 },

    /// Slice length does not match a fixed-width type.
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Unknown type tag or enum discriminant.
    #[error("Invalid {kind} tag: 0x{tag:02x}")]
    InvalidTag { kind: &'static str, tag: u8 },

    /// Bytes are not valid UTF-8.
    #[error("Invalid UTF-8 string")]
    InvalidUtf8,

    /// Text does not parse as the requested value.
    #[error("Invalid text: {0}")]
    InvalidText(String),

    /// A structural invariant of the record was violated.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl FormatError {
    /// Shorthand for [`FormatError::InvalidData`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidData(reason.into())
    }
}

/// Result alias for decoding.
pub type FormatResult<T> = Result<T, FormatError>;

/// Fixed-point arithmetic and parsing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    /// Result does not fit the representation.
    #[error("Arithmetic overflow")]
    Overflow,

    /// Division by zero.
    #[error("Division by zero")]
    DivideByZero,

    /// Text is not a well-formed decimal number for this precision.
    #[error("Malformed decimal number")]
    Format,
}
