//! # Execution Prices
//!
//! Opcode and interop prices in units of 0.001 GAS. The engine multiplies
//! every price by [`RATIO`] to charge raw Fixed8 amounts.

use shared_crypto::opcode;

/// Raw Fixed8 per price unit.
pub const RATIO: i64 = 100_000;

pub mod costs {
    pub const FREE: i64 = 0;
    pub const DEFAULT: i64 = 1;
    pub const APPCALL: i64 = 10;
    pub const SHA256: i64 = 10;
    pub const HASH160: i64 = 20;
    pub const HASH256: i64 = 20;
    pub const CHECKSIG: i64 = 100;
    /// Per public key in the multisig.
    pub const CHECKMULTISIG_PER_KEY: i64 = 100;

    pub const STORAGE_GET: i64 = 100;
    pub const STORAGE_DELETE: i64 = 100;
    /// Per started KiB of key plus value.
    pub const STORAGE_PUT_PER_KIB: i64 = 1000;
    pub const CHECK_WITNESS: i64 = 200;
}

/// Price of an opcode whose cost does not depend on the stack.
pub fn opcode_price(op: u8) -> i64 {
    match op {
        _ if op <= opcode::PUSH16 => costs::FREE,
        opcode::NOP => costs::FREE,
        opcode::APPCALL => costs::APPCALL,
        opcode::SHA256 => costs::SHA256,
        opcode::HASH160 => costs::HASH160,
        opcode::HASH256 => costs::HASH256,
        opcode::CHECKSIG | opcode::VERIFY => costs::CHECKSIG,
        _ => costs::DEFAULT,
    }
}

/// `CHECKMULTISIG` over `keys` public keys.
pub fn multisig_price(keys: i64) -> i64 {
    if keys < 1 {
        costs::DEFAULT
    } else {
        keys.saturating_mul(costs::CHECKMULTISIG_PER_KEY)
    }
}

/// `System.Storage.Put` of a key and value totalling `bytes`.
pub fn storage_put_price(bytes: usize) -> i64 {
    let kib = bytes.saturating_sub(1) / 1024 + 1;
    i64::try_from(kib)
        .unwrap_or(i64::MAX)
        .saturating_mul(costs::STORAGE_PUT_PER_KIB)
}
