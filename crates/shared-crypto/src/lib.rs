//! # Shared Crypto
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA-256, SHA-256x2, RIPEMD-160 | Inventory hashes, script hashes, checksums |
//! | `ecdsa` | ECDSA over secp256r1 | Witness signatures, consensus signing |
//! | `contract` | Script builder | Signature and multisig verification scripts |
//!
//! ## Conventions
//!
//! - Inventory hashes are `Hash256(unsigned payload)` stored as [`UInt256`].
//! - Script hashes are `RIPEMD160(SHA256(script))` stored as [`UInt160`].
//! - Signatures are 64 bytes `r || s` over `SHA256(message)`.
//!
//! [`UInt256`]: shared_types::UInt256
//! [`UInt160`]: shared_types::UInt160

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod contract;
pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod opcode;

pub use contract::{
    is_multisig_contract, is_signature_contract, multisig_redeem_script,
    signature_contract_hash, signature_redeem_script, ScriptBuilder,
};
pub use ecdsa::{verify_signature, KeyPair, PublicKey, Signature, SIGNATURE_LEN};
pub use errors::CryptoError;
pub use hashing::{checksum, hash160, hash256, ripemd160, script_hash, sha256};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_hash_of_signature_script_is_stable() {
        let keypair = KeyPair::from_bytes([7u8; 32]).unwrap();
        let mut script = vec![0x21];
        script.extend_from_slice(keypair.public_key().as_bytes());
        script.push(0xAC);
        assert_eq!(script_hash(&script), script_hash(&script));
        assert_ne!(script_hash(&script), script_hash(&script[..34]));
    }
}
