//! Errors raised while decoding keys and checking signatures.

use thiserror::Error;

/// Key, signature and script-construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// `m` must be in `1..=n` and `n` at most 1024.
    #[error("cannot build a {m}-of-{n} multisig script")]
    InvalidMultisig {
        /// Signatures required.
        m: usize,
        /// Keys supplied.
        n: usize,
    },

    /// Well-formed signature that does not verify.
    #[error("signature does not match the message and key")]
    SignatureVerificationFailed,

    /// Anything but 64 bytes of `r || s`.
    #[error("signature is not 64 bytes")]
    InvalidSignatureFormat,

    /// Encoded point is not on secp256r1 or has an unknown prefix.
    #[error("invalid secp256r1 public key")]
    InvalidPublicKey,

    /// Scalar is zero or not below the curve order.
    #[error("invalid secp256r1 private key")]
    InvalidPrivateKey,
}
