//! # Hashing
//!
//! SHA-256 and RIPEMD-160 compositions used across the protocol.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use shared_types::{UInt160, UInt256};

/// Single SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Single RIPEMD-160.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

/// SHA-256 applied twice. Identifies blocks, transactions and payloads.
pub fn hash256(data: &[u8]) -> UInt256 {
    UInt256::new(sha256(&sha256(data)))
}

/// RIPEMD-160 of SHA-256.
pub fn hash160(data: &[u8]) -> UInt160 {
    UInt160::new(ripemd160(&sha256(data)))
}

/// Hash identifying a verification script.
pub fn script_hash(script: &[u8]) -> UInt160 {
    hash160(script)
}

/// First four bytes of the double SHA-256, read as little-endian.
pub fn checksum(data: &[u8]) -> u32 {
    let digest = hash256(data);
    let b = digest.as_bytes();
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}
