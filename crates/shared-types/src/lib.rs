//! # Shared Types Crate
//!
//! Primitive value types and the binary codec every wire message and storage
//! record is built on.
//!
//! | Module | Contents |
//! |--------|----------|
//! | `uint` | `UInt160`, `UInt256` fixed-width little-endian hashes |
//! | `fixed8` | `Fixed8`, a signed amount scaled by 10^8 |
//! | `big_decimal` | `BigDecimal`, arbitrary precision amount with explicit decimals |
//! | `io` | `BinaryReader`, `BinaryWriter` and the `Serializable` contract |
//! | `errors` | `FormatError`, `ArithmeticError` |
//!
//! ## Encoding Rules
//!
//! - Integers are little-endian.
//! - Lengths and counts use the variable-length integer (`0xFD`/`0xFE`/`0xFF` prefixes).
//! - Every reader call that accepts a length takes an explicit maximum and fails
//!   with [`FormatError::LimitExceeded`] before allocating.

pub mod big_decimal;
pub mod errors;
pub mod fixed8;
pub mod io;
pub mod uint;

pub use big_decimal::BigDecimal;
pub use errors::*;
pub use fixed8::Fixed8;
pub use io::{
    array_size, var_bytes_size, var_int_size, var_string_size, BinaryReader, BinaryWriter,
    Serializable,
};
pub use uint::{UInt160, UInt256};
