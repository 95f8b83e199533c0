//! Fixtures for the consensus tests: a four-validator chain, a relay that
//! records instead of gossiping and a settable clock.

use crate::config::ConsensusConfig;
use crate::ports::{Clock, ConsensusRelay};
use crate::service::{ConsensusDependencies, ConsensusService};
use dc_01_peer_network::InventoryItem;
use dc_02_ledger::{
    genesis, AcceptAllPolicy, Block, Blockchain, CoinReference, ConsensusPayload,
    ContractExecutor, Header, ProtocolSettings, Snapshot, Transaction, TransactionOutput,
    Verifiable, Witness, WitnessVerifier,
};
use dc_03_state_cache::MemoryStore;
use dc_05_mempool::{MemoryPool, MempoolConfig};
use parking_lot::Mutex;
use shared_crypto::{opcode, KeyPair};
use shared_types::{Fixed8, UInt160, UInt256};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

pub const COINS: u16 = 8;

pub struct AcceptAllVerifier;

impl WitnessVerifier for AcceptAllVerifier {
    fn verify_witnesses(&self, _verifiable: &dyn Verifiable, _snapshot: &Snapshot) -> bool {
        true
    }
}

pub struct HaltingExecutor;

impl ContractExecutor for HaltingExecutor {
    fn execute(&self, _tx: &Transaction, _snapshot: &mut Snapshot) -> bool {
        true
    }
}

/// The four standby validators' key pairs.
pub fn keys() -> Vec<KeyPair> {
    (1..=4u8)
        .map(|i| KeyPair::from_bytes([i; 32]).unwrap())
        .collect()
}

fn next_block(chain: &Blockchain, transactions: Vec<Transaction>) -> Block {
    let prev = chain.get_header_by_height(chain.height()).unwrap().unwrap();
    let index = prev.index + 1;
    let mut all = vec![Transaction::miner(index, Vec::new())];
    all.extend(transactions);
    let header = Header {
        version: 0,
        prev_hash: prev.hash(),
        merkle_root: UInt256::ZERO,
        timestamp: prev.timestamp + 15,
        index,
        consensus_data: u64::from(index),
        next_consensus: chain
            .get_consensus_address(&chain.settings().standby_validators)
            .unwrap(),
        witness: Witness::new(Vec::new(), vec![opcode::PUSHT]),
    };
    Block::new(header, all)
}

/// Chain at height 1 whose block 1 split the governing supply into
/// [`COINS`] outputs.
pub fn test_chain() -> (Arc<Blockchain>, Transaction) {
    let standby = keys().iter().map(KeyPair::public_key).collect();
    let chain = Arc::new(
        Blockchain::new(
            ProtocolSettings::for_testing(standby),
            Arc::new(MemoryStore::new()),
            Arc::new(AcceptAllVerifier),
            Arc::new(HaltingExecutor),
        )
        .unwrap(),
    );
    let genesis_block = chain.get_block_by_height(0).unwrap().unwrap();
    let share = genesis::GOVERNING_TOKEN_TOTAL / i64::from(COINS);
    let split = Transaction::contract(
        vec![CoinReference::new(genesis_block.transactions[0].hash(), 0)],
        (0..COINS)
            .map(|i| {
                TransactionOutput::new(
                    genesis::governing_token_id(),
                    Fixed8::from_units(share).unwrap(),
                    UInt160::from([i as u8 + 1; 20]),
                )
            })
            .collect(),
    );
    chain
        .add_block(next_block(&chain, vec![split.clone()]))
        .unwrap();
    (chain, split)
}

pub fn spend(split: &Transaction, index: u16, salt: u8) -> Transaction {
    let value = split.outputs()[usize::from(index)].value;
    Transaction::contract(
        vec![CoinReference::new(split.hash(), index)],
        vec![TransactionOutput::new(
            genesis::governing_token_id(),
            value,
            UInt160::from([salt; 20]),
        )],
    )
}

pub fn mempool(chain: &Arc<Blockchain>) -> Arc<MemoryPool> {
    Arc::new(MemoryPool::new(
        MempoolConfig::for_testing(),
        Arc::clone(chain),
        Arc::new(AcceptAllPolicy),
    ))
}

#[derive(Default)]
pub struct RecordingRelay {
    items: Mutex<Vec<InventoryItem>>,
    requested: Mutex<Vec<UInt256>>,
    syncs: AtomicUsize,
}

impl RecordingRelay {
    /// Consensus payloads relayed since the last call.
    pub fn take_payloads(&self) -> Vec<ConsensusPayload> {
        let mut items = self.items.lock();
        let (payloads, rest): (Vec<_>, Vec<_>) = items
            .drain(..)
            .partition(|item| matches!(item, InventoryItem::Consensus(_)));
        *items = rest;
        payloads
            .into_iter()
            .filter_map(|item| match item {
                InventoryItem::Consensus(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.items
            .lock()
            .iter()
            .filter_map(|item| match item {
                InventoryItem::Block(block) => Some(block.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn requested(&self) -> Vec<UInt256> {
        self.requested.lock().clone()
    }

    pub fn syncs(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }
}

impl ConsensusRelay for RecordingRelay {
    fn relay(&self, item: InventoryItem) -> bool {
        self.items.lock().push(item);
        true
    }

    fn request_transactions(&self, hashes: &[UInt256]) {
        self.requested.lock().extend_from_slice(hashes);
    }

    fn synchronize_memory_pool(&self) {
        self.syncs.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FixedClock(pub AtomicU32);

impl Clock for FixedClock {
    fn now(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// One validator under test.
pub struct Node {
    pub service: Arc<ConsensusService>,
    pub relay: Arc<RecordingRelay>,
}

/// The standby key pairs in validator order.
pub fn validator_keys(chain: &Blockchain) -> Vec<KeyPair> {
    let order = chain.get_validators().unwrap();
    let mut pairs = keys();
    pairs.sort_by_key(|pair| order.iter().position(|key| *key == pair.public_key()));
    pairs
}

/// One started service per validator, ordered by validator index. They
/// share `chain` and `pool`; the clock reads 15 s after the tip.
pub fn validators(chain: &Arc<Blockchain>, pool: &Arc<MemoryPool>) -> Vec<Node> {
    let tip = chain.get_header_by_height(chain.height()).unwrap().unwrap();
    let clock = Arc::new(FixedClock(AtomicU32::new(tip.timestamp + 15)));
    validator_keys(chain)
        .into_iter()
        .map(|pair| {
            let relay = Arc::new(RecordingRelay::default());
            let service = Arc::new(ConsensusService::new(ConsensusDependencies {
                chain: Arc::clone(chain),
                mempool: Arc::clone(pool),
                relay: Arc::clone(&relay) as Arc<dyn ConsensusRelay>,
                clock: Arc::clone(&clock) as Arc<dyn Clock>,
                key_pair: Some(pair),
                config: ConsensusConfig::for_testing(),
            }));
            service.start().unwrap();
            Node { service, relay }
        })
        .collect()
}

/// Deliver every payload each node relayed to every other node until no
/// node has anything left to say. Returns the number delivered.
pub fn pump(nodes: &[Node]) -> usize {
    let mut delivered = 0;
    loop {
        let batch: Vec<(usize, ConsensusPayload)> = nodes
            .iter()
            .enumerate()
            .flat_map(|(from, node)| {
                node.relay
                    .take_payloads()
                    .into_iter()
                    .map(move |payload| (from, payload))
            })
            .collect();
        if batch.is_empty() {
            return delivered;
        }
        for (from, payload) in batch {
            for (to, node) in nodes.iter().enumerate() {
                if to != from {
                    node.service.on_consensus_payload(&payload);
                    delivered += 1;
                }
            }
        }
    }
}
