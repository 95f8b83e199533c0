//! # Script Builder and Standard Contracts
//!
//! Emits the push encodings the engine decodes and builds the two standard
//! verification scripts:
//!
//! | Contract | Script |
//! |----------|--------|
//! | Signature | `PUSHBYTES33 <pubkey> CHECKSIG` |
//! | Multisig | `PUSH(m) <pubkeys sorted> PUSH(n) CHECKMULTISIG` |

use crate::ecdsa::PublicKey;
use crate::hashing::script_hash;
use crate::opcode;
use crate::CryptoError;
use shared_types::UInt160;

/// Upper bound on keys in a multisig contract.
pub const MAX_MULTISIG_KEYS: usize = 1024;

/// Append-only script assembler.
#[derive(Debug, Default, Clone)]
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw opcode.
    pub fn emit(&mut self, op: u8) -> &mut Self {
        self.script.push(op);
        self
    }

    /// Smallest push for `data`.
    pub fn emit_push_bytes(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len();
        if len <= usize::from(opcode::PUSHBYTES75) {
            self.script.push(len as u8);
        } else if len <= 0xFF {
            self.script.push(opcode::PUSHDATA1);
            self.script.push(len as u8);
        } else if len <= 0xFFFF {
            self.script.push(opcode::PUSHDATA2);
            self.script.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.script.push(opcode::PUSHDATA4);
            self.script.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.script.extend_from_slice(data);
        self
    }

    /// Smallest push for an integer: `PUSHM1`, `PUSH0`..`PUSH16`, or its
    /// minimal little-endian two's complement bytes.
    pub fn emit_push_int(&mut self, value: i64) -> &mut Self {
        match value {
            -1 => self.emit(opcode::PUSHM1),
            0 => self.emit(opcode::PUSH0),
            1..=16 => self.emit(opcode::PUSH1 - 1 + value as u8),
            _ => {
                let bytes = minimal_le_bytes(value);
                self.emit_push_bytes(&bytes)
            }
        }
    }

    /// `PUSHT` / `PUSH0`.
    pub fn emit_push_bool(&mut self, value: bool) -> &mut Self {
        self.emit(if value { opcode::PUSHT } else { opcode::PUSH0 })
    }

    /// Call the contract stored under `script_hash`.
    pub fn emit_app_call(&mut self, script_hash: &UInt160) -> &mut Self {
        self.script.push(opcode::APPCALL);
        self.script.extend_from_slice(script_hash.as_bytes());
        self
    }

    /// Invoke an interop service by name.
    pub fn emit_syscall(&mut self, api: &str) -> &mut Self {
        self.script.push(opcode::SYSCALL);
        self.script.push(api.len() as u8);
        self.script.extend_from_slice(api.as_bytes());
        self
    }

    /// Finished script bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.script.clone()
    }

    /// Consume into script bytes.
    pub fn into_script(self) -> Vec<u8> {
        self.script
    }
}

fn minimal_le_bytes(value: i64) -> Vec<u8> {
    let mut bytes = value.to_le_bytes().to_vec();
    while bytes.len() > 1 {
        let last = bytes[bytes.len() - 1];
        let prev_sign = bytes[bytes.len() - 2] & 0x80;
        if (last == 0x00 && prev_sign == 0) || (last == 0xFF && prev_sign != 0) {
            bytes.pop();
        } else {
            break;
        }
    }
    bytes
}

/// Single-key verification script.
pub fn signature_redeem_script(public_key: &PublicKey) -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    builder
        .emit_push_bytes(public_key.as_bytes())
        .emit(opcode::CHECKSIG);
    builder.into_script()
}

/// `m`-of-`n` verification script over `public_keys`, which are sorted.
pub fn multisig_redeem_script(m: usize, public_keys: &[PublicKey]) -> Result<Vec<u8>, CryptoError> {
    let n = public_keys.len();
    if m == 0 || m > n || n > MAX_MULTISIG_KEYS {
        return Err(CryptoError::InvalidMultisig { m, n });
    }
    let mut sorted = public_keys.to_vec();
    sorted.sort();
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(m as i64);
    for key in &sorted {
        builder.emit_push_bytes(key.as_bytes());
    }
    builder
        .emit_push_int(n as i64)
        .emit(opcode::CHECKMULTISIG);
    Ok(builder.into_script())
}

/// Script hash of the single-key contract for `public_key`.
pub fn signature_contract_hash(public_key: &PublicKey) -> UInt160 {
    script_hash(&signature_redeem_script(public_key))
}

/// True for `PUSHBYTES33 <33 bytes> CHECKSIG`.
pub fn is_signature_contract(script: &[u8]) -> bool {
    script.len() == 35 && script[0] == 33 && script[34] == opcode::CHECKSIG
}

/// Parse `(m, n)` from a multisig script, or `None` if it is not one.
pub fn parse_multisig_contract(script: &[u8]) -> Option<(usize, Vec<&[u8]>)> {
    if script.len() < 37 {
        return None;
    }
    let mut i = 0usize;
    let m = read_small_int(script, &mut i)?;
    if m < 1 || m > MAX_MULTISIG_KEYS {
        return None;
    }
    let mut keys = Vec::new();
    while *script.get(i)? == 33 {
        keys.push(script.get(i + 1..i + 34)?);
        i += 34;
        if script.len() <= i {
            return None;
        }
    }
    let n = keys.len();
    if n < m || n > MAX_MULTISIG_KEYS {
        return None;
    }
    if read_small_int(script, &mut i)? != n {
        return None;
    }
    if *script.get(i)? != opcode::CHECKMULTISIG || script.len() != i + 1 {
        return None;
    }
    Some((m, keys))
}

/// True for a well-formed multisig script.
pub fn is_multisig_contract(script: &[u8]) -> bool {
    parse_multisig_contract(script).is_some()
}

fn read_small_int(script: &[u8], i: &mut usize) -> Option<usize> {
    let op = *script.get(*i)?;
    match op {
        1 => {
            let v = *script.get(*i + 1)?;
            *i += 2;
            Some(usize::from(v))
        }
        2 => {
            let b = script.get(*i + 1..*i + 3)?;
            *i += 3;
            Some(usize::from(u16::from_le_bytes([b[0], b[1]])))
        }
        opcode::PUSH1..=opcode::PUSH16 => {
            *i += 1;
            Some(usize::from(op - opcode::PUSH1 + 1))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    fn keys(n: u8) -> Vec<PublicKey> {
        (1..=n)
            .map(|i| KeyPair::from_bytes([i; 32]).unwrap().public_key())
            .collect()
    }

    #[test]
    fn test_push_int_encodings() {
        let mut b = ScriptBuilder::new();
        b.emit_push_int(0).emit_push_int(1).emit_push_int(16).emit_push_int(-1);
        assert_eq!(b.to_vec(), vec![0x00, 0x51, 0x60, 0x4F]);

        let mut b = ScriptBuilder::new();
        b.emit_push_int(17).emit_push_int(128).emit_push_int(1024);
        assert_eq!(b.to_vec(), vec![1, 17, 2, 128, 0, 2, 0, 4]);
    }

    #[test]
    fn test_push_bytes_prefixes() {
        let mut b = ScriptBuilder::new();
        b.emit_push_bytes(&[7u8; 75]);
        assert_eq!(b.to_vec()[0], 75);
        let mut b = ScriptBuilder::new();
        b.emit_push_bytes(&[7u8; 76]);
        assert_eq!(&b.to_vec()[..2], &[opcode::PUSHDATA1, 76]);
        let mut b = ScriptBuilder::new();
        b.emit_push_bytes(&[7u8; 256]);
        assert_eq!(&b.to_vec()[..3], &[opcode::PUSHDATA2, 0, 1]);
    }

    #[test]
    fn test_signature_contract_shape() {
        let key = keys(1)[0];
        let script = signature_redeem_script(&key);
        assert!(is_signature_contract(&script));
        assert!(!is_multisig_contract(&script));
    }

    #[test]
    fn test_multisig_contract_round_trip() {
        let validators = keys(4);
        let script = multisig_redeem_script(3, &validators).unwrap();
        let (m, parsed) = parse_multisig_contract(&script).unwrap();
        assert_eq!(m, 3);
        assert_eq!(parsed.len(), 4);

        let mut sorted = validators.clone();
        sorted.sort();
        for (raw, key) in parsed.iter().zip(&sorted) {
            assert_eq!(*raw, &key.as_bytes()[..]);
        }
        // key order in the input does not change the contract
        let mut reversed = validators;
        reversed.reverse();
        assert_eq!(multisig_redeem_script(3, &reversed).unwrap(), script);
    }

    #[test]
    fn test_multisig_rejects_bad_thresholds() {
        let validators = keys(2);
        assert!(multisig_redeem_script(0, &validators).is_err());
        assert!(multisig_redeem_script(3, &validators).is_err());
        let mut script = multisig_redeem_script(2, &validators).unwrap();
        script.push(0x00);
        assert!(!is_multisig_contract(&script));
    }
}
