//! Standard verification contracts and the witnesses that satisfy them.

use dc_02_ledger::Witness;
use shared_crypto::contract::parse_multisig_contract;
use shared_crypto::{
    is_signature_contract, multisig_redeem_script, script_hash, signature_redeem_script,
    CryptoError, PublicKey, ScriptBuilder, Signature,
};
use shared_types::UInt160;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContractParameterType {
    Signature = 0x00,
    Boolean = 0x01,
    Integer = 0x02,
    Hash160 = 0x03,
    Hash256 = 0x04,
    ByteArray = 0x05,
    PublicKey = 0x06,
    String = 0x07,
    Array = 0x10,
    InteropInterface = 0xF0,
    Void = 0xFF,
}

/// A verification script plus the parameters its invocation script pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    pub script: Vec<u8>,
    pub parameter_list: Vec<ContractParameterType>,
}

impl Contract {
    pub fn create_signature_contract(public_key: &PublicKey) -> Self {
        Self {
            script: signature_redeem_script(public_key),
            parameter_list: vec![ContractParameterType::Signature],
        }
    }

    /// `m`-of-`public_keys.len()` contract; keys are sorted in the script.
    pub fn create_multisig_contract(m: usize, public_keys: &[PublicKey]) -> Result<Self, CryptoError> {
        Ok(Self {
            script: multisig_redeem_script(m, public_keys)?,
            parameter_list: vec![ContractParameterType::Signature; m],
        })
    }

    pub fn script_hash(&self) -> UInt160 {
        script_hash(&self.script)
    }

    /// Keys named by a standard contract, in script order.
    pub fn public_keys(&self) -> Vec<PublicKey> {
        if is_signature_contract(&self.script) {
            return PublicKey::from_bytes(&self.script[1..34]).into_iter().collect();
        }
        parse_multisig_contract(&self.script)
            .map(|(_, keys)| {
                keys.into_iter()
                    .filter_map(|raw| PublicKey::from_bytes(raw).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Witness from the collected `signatures`, or `None` while fewer than
    /// the required number are present. Signatures are pushed in the
    /// script's key order, as `CHECKMULTISIG` expects.
    pub fn create_witness(&self, signatures: &BTreeMap<PublicKey, Signature>) -> Option<Witness> {
        let required = self.parameter_list.len();
        let ordered: Vec<&Signature> = self
            .public_keys()
            .iter()
            .filter_map(|key| signatures.get(key))
            .take(required)
            .collect();
        if required == 0 || ordered.len() < required {
            return None;
        }
        let mut builder = ScriptBuilder::new();
        for signature in ordered {
            builder.emit_push_bytes(signature.as_bytes());
        }
        Some(Witness::new(builder.into_script(), self.script.clone()))
    }
}
