//! # ECDSA Signatures (secp256r1)
//!
//! Keys and signatures over the NIST P-256 curve.
//!
//! ## Properties
//!
//! - RFC 6979 deterministic nonces
//! - Message is hashed with SHA-256 before signing
//! - Public keys travel compressed (33 bytes); uncompressed input (65 bytes)
//!   is accepted and normalized
//! - Public keys order by X coordinate, then Y, both as big-endian integers

use crate::CryptoError;
use p256::ecdsa::{
    signature::{Signer, Verifier},
    Signature as P256Signature, SigningKey, VerifyingKey,
};
use shared_types::{BinaryReader, BinaryWriter, FormatError, Serializable};
use std::cmp::Ordering;
use std::fmt;

/// Length of an `r || s` signature.
pub const SIGNATURE_LEN: usize = 64;

/// Compressed secp256r1 public key (33 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 33]);

impl PublicKey {
    /// Decode a SEC1 point, compressed or uncompressed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key = VerifyingKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        let encoded = key.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(encoded.as_bytes());
        Ok(Self(out))
    }

    /// Compressed encoding.
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// Uncompressed encoding, `0x04 || X || Y`.
    pub fn to_uncompressed(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        // Construction already validated the point.
        if let Ok(key) = VerifyingKey::from_sec1_bytes(&self.0) {
            out.copy_from_slice(key.to_encoded_point(false).as_bytes());
        }
        out
    }

    /// Verify `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let key =
            VerifyingKey::from_sec1_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        if signature.len() != SIGNATURE_LEN {
            return Err(CryptoError::InvalidSignatureFormat);
        }
        let sig =
            P256Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignatureFormat)?;
        key.verify(message, &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.0 == other.0 {
            return Ordering::Equal;
        }
        self.to_uncompressed()[1..].cmp(&other.to_uncompressed()[1..])
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl std::str::FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidPublicKey)?;
        Self::from_bytes(&bytes)
    }
}

impl Serializable for PublicKey {
    fn size(&self) -> usize {
        33
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bytes(&self.0);
    }

    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        let prefix = reader.read_u8()?;
        let body_len = match prefix {
            0x02 | 0x03 => 32,
            0x04 => 64,
            other => {
                return Err(FormatError::InvalidTag {
                    kind: "point",
                    tag: other,
                })
            }
        };
        let mut encoded = Vec::with_capacity(body_len + 1);
        encoded.push(prefix);
        encoded.extend_from_slice(reader.read_bytes(body_len)?);
        Self::from_bytes(&encoded).map_err(|_| FormatError::invalid("point is not on the curve"))
    }
}

/// Raw `r || s` signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignatureFormat)?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

/// secp256r1 keypair.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Generate a random keypair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    /// Create from a 32-byte secret scalar.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let encoded = signing_key.verifying_key().to_encoded_point(true);
        let mut compressed = [0u8; 33];
        compressed.copy_from_slice(encoded.as_bytes());
        Self {
            signing_key,
            public_key: PublicKey(compressed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Sign `message` (SHA-256 is applied internally).
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig: P256Signature = self.signing_key.sign(message);
        Signature(sig.to_bytes().into())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Check a signature against encoded public key bytes. Malformed keys or
/// signatures verify as `false`.
pub fn verify_signature(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    PublicKey::from_bytes(public_key)
        .and_then(|key| key.verify(message, signature))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(b"header");
        assert!(keypair.public_key().verify(b"header", signature.as_bytes()).is_ok());
        assert!(verify_signature(
            b"header",
            signature.as_bytes(),
            keypair.public_key().as_bytes()
        ));
    }

    #[test]
    fn test_wrong_message_fails() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(b"message1");
        assert_eq!(
            keypair.public_key().verify(b"message2", signature.as_bytes()),
            Err(CryptoError::SignatureVerificationFailed)
        );
    }

    #[test]
    fn test_malformed_inputs_verify_false() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(b"m");
        assert!(!verify_signature(b"m", &signature.as_bytes()[..63], keypair.public_key().as_bytes()));
        assert!(!verify_signature(b"m", signature.as_bytes(), &[0x02; 33]));
    }

    #[test]
    fn test_deterministic_signatures() {
        let keypair = KeyPair::from_bytes([0xABu8; 32]).unwrap();
        assert_eq!(keypair.sign(b"x"), keypair.sign(b"x"));
    }

    #[test]
    fn test_uncompressed_input_normalizes() {
        let keypair = KeyPair::generate();
        let uncompressed = keypair.public_key().to_uncompressed();
        let parsed = PublicKey::from_bytes(&uncompressed).unwrap();
        assert_eq!(parsed, keypair.public_key());
    }

    #[test]
    fn test_serializable_round_trip_and_bad_prefix() {
        let key = KeyPair::generate().public_key();
        assert_eq!(PublicKey::from_array(&key.to_array()).unwrap(), key);
        let mut bytes = key.to_array();
        bytes[0] = 0x05;
        assert!(PublicKey::from_array(&bytes).is_err());
    }

    #[test]
    fn test_ordering_is_total_by_x_then_y() {
        let mut keys: Vec<PublicKey> = (1u8..=6)
            .map(|i| KeyPair::from_bytes([i; 32]).unwrap().public_key())
            .collect();
        keys.sort();
        for pair in keys.windows(2) {
            assert!(pair[0].to_uncompressed()[1..33] <= pair[1].to_uncompressed()[1..33]);
        }
    }
}
