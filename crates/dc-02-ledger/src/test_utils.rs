//! Fixtures shared by the ledger's unit tests.

use crate::config::ProtocolSettings;
use crate::domain::{validators, Block, Header, Transaction, Verifiable, Witness};
use crate::ports::{ContractExecutor, WitnessVerifier};
use crate::service::Blockchain;
use crate::snapshot::Snapshot;
use dc_03_state_cache::MemoryStore;
use shared_crypto::{opcode, KeyPair, PublicKey};
use std::sync::Arc;

pub struct AcceptAllVerifier;

impl WitnessVerifier for AcceptAllVerifier {
    fn verify_witnesses(&self, _verifiable: &dyn Verifiable, _snapshot: &Snapshot) -> bool {
        true
    }
}

pub struct RejectAllVerifier;

impl WitnessVerifier for RejectAllVerifier {
    fn verify_witnesses(&self, _verifiable: &dyn Verifiable, _snapshot: &Snapshot) -> bool {
        false
    }
}

pub struct HaltingExecutor;

impl ContractExecutor for HaltingExecutor {
    fn execute(&self, _tx: &Transaction, _snapshot: &mut Snapshot) -> bool {
        true
    }
}

pub fn validator_keys(n: u8) -> Vec<KeyPair> {
    (1..=n)
        .map(|i| KeyPair::from_bytes([i; 32]).unwrap())
        .collect()
}

pub fn standby(n: u8) -> Vec<PublicKey> {
    validator_keys(n).iter().map(KeyPair::public_key).collect()
}

/// Four-validator chain over a memory store with witness checks stubbed out.
pub fn test_chain() -> (Blockchain, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let chain = Blockchain::new(
        ProtocolSettings::for_testing(standby(4)),
        store.clone(),
        Arc::new(AcceptAllVerifier),
        Arc::new(HaltingExecutor),
    )
    .unwrap();
    (chain, store)
}

/// Block on top of `prev` carrying a fresh miner transaction and `transactions`.
pub fn next_block(chain: &Blockchain, prev: &Header, transactions: Vec<Transaction>) -> Block {
    let index = prev.index + 1;
    let mut all = vec![Transaction::miner(index, Vec::new())];
    all.extend(transactions);
    let header = Header {
        version: 0,
        prev_hash: prev.hash(),
        merkle_root: Default::default(),
        timestamp: prev.timestamp + 15,
        index,
        consensus_data: u64::from(index),
        next_consensus: validators::consensus_address(&chain.settings().standby_validators)
            .unwrap(),
        witness: Witness::new(Vec::new(), vec![opcode::PUSHT]),
    };
    Block::new(header, all)
}
