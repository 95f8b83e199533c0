//! Fixtures shared by the engine and gate tests.

use crate::adapters::{ScriptContractExecutor, ScriptWitnessVerifier};
use dc_02_ledger::{
    contract_properties, Blockchain, ContractState, LedgerResult, ProtocolSettings, Snapshot,
    Verifiable, Witness,
};
use dc_03_state_cache::MemoryStore;
use shared_crypto::KeyPair;
use shared_types::UInt160;
use std::sync::Arc;

pub fn keys(n: u8) -> Vec<KeyPair> {
    (1..=n)
        .map(|i| KeyPair::from_bytes([i; 32]).unwrap())
        .collect()
}

/// Snapshot of a fresh four-validator chain holding only genesis.
pub fn snapshot() -> Snapshot {
    let validators = keys(4).iter().map(KeyPair::public_key).collect();
    let chain = Blockchain::new(
        ProtocolSettings::for_testing(validators),
        Arc::new(MemoryStore::new()),
        Arc::new(ScriptWitnessVerifier),
        Arc::new(ScriptContractExecutor),
    )
    .unwrap();
    chain.snapshot()
}

/// Deployable contract with storage enabled.
pub fn storage_contract(script: Vec<u8>) -> ContractState {
    ContractState {
        script,
        parameter_list: Vec::new(),
        return_type: 0xFF,
        properties: contract_properties::HAS_STORAGE,
        name: "test".into(),
        code_version: "1.0".into(),
        author: String::new(),
        email: String::new(),
        description: String::new(),
    }
}

/// Verifiable with fixed signed data and required hashes.
#[derive(Debug, Default)]
pub struct StaticContainer {
    pub data: Vec<u8>,
    pub hashes: Vec<UInt160>,
    pub witnesses: Vec<Witness>,
}

impl StaticContainer {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }
}

impl Verifiable for StaticContainer {
    fn witnesses(&self) -> &[Witness] {
        &self.witnesses
    }

    fn hash_data(&self) -> Vec<u8> {
        self.data.clone()
    }

    fn script_hashes_for_verifying(&self, _snapshot: &Snapshot) -> LedgerResult<Vec<UInt160>> {
        Ok(self.hashes.clone())
    }
}
