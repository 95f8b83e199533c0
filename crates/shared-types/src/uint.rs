//! # Fixed-Width Hashes
//!
//! `UInt160` (script hashes) and `UInt256` (block, transaction and asset ids).
//!
//! Bytes are stored in little-endian order, the order in which they appear on
//! the wire. Ordering compares from the most significant byte (the last one)
//! down, and the display form is `0x` followed by big-endian hex.

use crate::errors::FormatError;
use crate::io::{BinaryReader, BinaryWriter, Serializable};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

macro_rules! define_uint {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Width in bytes.
            pub const LEN: usize = $len;

            /// The all-zero value.
            pub const ZERO: Self = Self([0u8; $len]);

            /// Wrap little-endian bytes.
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Copy from a little-endian slice, checking the length.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, FormatError> {
                let array: [u8; $len] =
                    bytes.try_into().map_err(|_| FormatError::InvalidLength {
                        expected: $len,
                        actual: bytes.len(),
                    })?;
                Ok(Self(array))
            }

            /// Little-endian bytes.
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Owned little-endian bytes.
            pub fn to_vec(&self) -> Vec<u8> {
                self.0.to_vec()
            }

            /// True for the all-zero value.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.iter().rev().cmp(other.0.iter().rev())
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut be = self.0;
                be.reverse();
                write!(f, "0x{}", hex::encode(be))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }

        impl FromStr for $name {
            type Err = FormatError;

            /// Parses the big-endian display form, `0x` prefix optional.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let digits = s.strip_prefix("0x").unwrap_or(s);
                if digits.len() != $len * 2 {
                    return Err(FormatError::InvalidLength {
                        expected: $len * 2,
                        actual: digits.len(),
                    });
                }
                let mut bytes = hex::decode(digits)
                    .map_err(|e| FormatError::InvalidText(e.to_string()))?;
                bytes.reverse();
                Self::from_slice(&bytes)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serializable for $name {
            fn size(&self) -> usize {
                $len
            }

            fn serialize(&self, writer: &mut BinaryWriter) {
                writer.write_bytes(&self.0);
            }

            fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
                Self::from_slice(reader.read_bytes($len)?)
            }
        }
    };
}

define_uint!(
    /// 160-bit hash, the RIPEMD-160 of a SHA-256. Identifies scripts and accounts.
    UInt160,
    20
);

define_uint!(
    /// 256-bit hash, the double SHA-256 of an unsigned payload.
    UInt256,
    32
);
