//! # Stack Items
//!
//! Values on the evaluation stack. Items convert freely between their
//! boolean, integer and byte forms; integers are little-endian two's
//! complement and at most 32 bytes wide.

use super::errors::{VmError, VmResult};
use num_bigint::BigInt;
use shared_types::UInt160;

/// Widest integer an arithmetic operation may produce or consume.
pub const MAX_INTEGER_SIZE: usize = 32;

/// Storage scope handed out by `System.Storage.GetContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageContext {
    pub script_hash: UInt160,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackItem {
    Boolean(bool),
    Integer(BigInt),
    ByteArray(Vec<u8>),
    StorageContext(StorageContext),
}

impl StackItem {
    pub fn to_bool(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::Integer(i) => i.sign() != num_bigint::Sign::NoSign,
            Self::ByteArray(bytes) => bytes.iter().any(|b| *b != 0),
            Self::StorageContext(_) => true,
        }
    }

    pub fn to_integer(&self) -> VmResult<BigInt> {
        match self {
            Self::Boolean(b) => Ok(BigInt::from(u8::from(*b))),
            Self::Integer(i) => Ok(i.clone()),
            Self::ByteArray(bytes) if bytes.len() > MAX_INTEGER_SIZE => {
                Err(VmError::IntegerTooLarge)
            }
            Self::ByteArray(bytes) => Ok(BigInt::from_signed_bytes_le(bytes)),
            Self::StorageContext(_) => Err(VmError::WrongType("integer")),
        }
    }

    /// Byte form; zero and `false` are empty.
    pub fn to_bytes(&self) -> VmResult<Vec<u8>> {
        match self {
            Self::Boolean(true) => Ok(vec![1]),
            Self::Boolean(false) => Ok(Vec::new()),
            Self::Integer(i) if i.sign() == num_bigint::Sign::NoSign => Ok(Vec::new()),
            Self::Integer(i) => Ok(i.to_signed_bytes_le()),
            Self::ByteArray(bytes) => Ok(bytes.clone()),
            Self::StorageContext(_) => Err(VmError::WrongType("byte array")),
        }
    }

    pub fn to_storage_context(&self) -> VmResult<StorageContext> {
        match self {
            Self::StorageContext(context) => Ok(*context),
            _ => Err(VmError::WrongType("storage context")),
        }
    }

    /// `EQUAL` semantics: byte-wise for primitive items, identity for contexts.
    pub fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::StorageContext(a), Self::StorageContext(b)) => a == b,
            (Self::StorageContext(_), _) | (_, Self::StorageContext(_)) => false,
            _ => matches!((self.to_bytes(), other.to_bytes()), (Ok(a), Ok(b)) if a == b),
        }
    }
}

impl From<bool> for StackItem {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<BigInt> for StackItem {
    fn from(value: BigInt) -> Self {
        Self::Integer(value)
    }
}

impl From<Vec<u8>> for StackItem {
    fn from(value: Vec<u8>) -> Self {
        Self::ByteArray(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_truthiness() {
        assert!(!StackItem::ByteArray(vec![0, 0]).to_bool());
        assert!(StackItem::ByteArray(vec![0, 1]).to_bool());
        assert!(!StackItem::Integer(BigInt::from(0)).to_bool());
        assert!(StackItem::Integer(BigInt::from(-3)).to_bool());
        assert!(!StackItem::ByteArray(Vec::new()).to_bool());
    }

    #[test]
    fn test_integer_byte_forms() {
        assert_eq!(StackItem::Integer(BigInt::from(0)).to_bytes().unwrap(), Vec::<u8>::new());
        assert_eq!(StackItem::Integer(BigInt::from(-1)).to_bytes().unwrap(), vec![0xFF]);
        assert_eq!(StackItem::Integer(BigInt::from(128)).to_bytes().unwrap(), vec![0x80, 0x00]);
        assert_eq!(
            StackItem::ByteArray(vec![0x80]).to_integer().unwrap(),
            BigInt::from(-128)
        );
        assert_eq!(
            StackItem::ByteArray(vec![0; 33]).to_integer(),
            Err(VmError::IntegerTooLarge)
        );
    }

    #[test]
    fn test_equality_crosses_types() {
        assert!(StackItem::Boolean(true).equals(&StackItem::Integer(BigInt::from(1))));
        assert!(StackItem::Boolean(false).equals(&StackItem::ByteArray(Vec::new())));
        assert!(!StackItem::ByteArray(vec![0]).equals(&StackItem::ByteArray(Vec::new())));
    }

    proptest! {
        #[test]
        fn test_integer_survives_byte_form(value in any::<i64>()) {
            let item = StackItem::Integer(BigInt::from(value));
            let back = StackItem::ByteArray(item.to_bytes().unwrap()).to_integer().unwrap();
            prop_assert_eq!(back, BigInt::from(value));
        }
    }
}
