//! Fixtures for the memory pool tests: a chain whose governing supply is
//! split into independently spendable coins, with witness checks stubbed.

use crate::config::MempoolConfig;
use crate::service::MemoryPool;
use dc_02_ledger::{
    genesis, AcceptAllPolicy, Block, Blockchain, CoinReference, ContractExecutor, Header,
    PolicyPlugin, ProtocolSettings, Snapshot, Transaction, TransactionOutput, Verifiable,
    Witness, WitnessVerifier,
};
use dc_03_state_cache::{CacheError, CacheResult, MemoryStore, Store, StoreView, WriteBatch};
use parking_lot::Mutex;
use shared_crypto::{opcode, KeyPair, PublicKey};
use shared_types::{Fixed8, UInt160, UInt256};
use std::collections::HashSet;
use std::sync::Arc;

/// Coins created in block 1.
pub const COINS: u16 = 8;

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

pub fn standby() -> Vec<PublicKey> {
    (1..=4u8)
        .map(|i| KeyPair::from_bytes([i; 32]).unwrap().public_key())
        .collect()
}

type Poisoned = Arc<Mutex<HashSet<Vec<u8>>>>;

/// Memory store whose reads of poisoned keys fail, including reads through
/// views taken before the key was poisoned.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    poisoned: Poisoned,
}

impl FlakyStore {
    /// Fail every later read of the transaction record for `hash`.
    pub fn poison_transaction(&self, hash: &UInt256) {
        let mut key = vec![dc_02_ledger::snapshot::prefix::TRANSACTION];
        key.extend_from_slice(hash.as_bytes());
        self.poisoned.lock().insert(key);
    }
}

fn check(poisoned: &Poisoned, key: &[u8]) -> CacheResult<()> {
    if poisoned.lock().contains(key) {
        return Err(CacheError::Store("read error".into()));
    }
    Ok(())
}

impl StoreView for FlakyStore {
    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        check(&self.poisoned, key)?;
        self.inner.get(key)
    }

    fn seek(&self, prefix: &[u8]) -> CacheResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.seek(prefix)
    }
}

impl Store for FlakyStore {
    fn snapshot(&self) -> Arc<dyn StoreView> {
        Arc::new(FlakyView {
            inner: self.inner.snapshot(),
            poisoned: Arc::clone(&self.poisoned),
        })
    }

    fn write(&self, batch: WriteBatch) -> CacheResult<()> {
        self.inner.write(batch)
    }
}

struct FlakyView {
    inner: Arc<dyn StoreView>,
    poisoned: Poisoned,
}

impl StoreView for FlakyView {
    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        check(&self.poisoned, key)?;
        self.inner.get(key)
    }

    fn seek(&self, prefix: &[u8]) -> CacheResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.seek(prefix)
    }
}

pub fn chain_on(store: Arc<dyn Store>, verifier: Arc<dyn WitnessVerifier>) -> Arc<Blockchain> {
    Arc::new(
        Blockchain::new(
            ProtocolSettings::for_testing(standby()),
            store,
            verifier,
            Arc::new(HaltingExecutor),
        )
        .unwrap(),
    )
}

pub fn chain_with(verifier: Arc<dyn WitnessVerifier>) -> Arc<Blockchain> {
    chain_on(Arc::new(MemoryStore::new()), verifier)
}

/// Block on top of the current tip carrying a miner transaction and
/// `transactions`.
pub fn next_block(chain: &Blockchain, transactions: Vec<Transaction>) -> Block {
    let prev = chain.get_header_by_height(chain.height()).unwrap().unwrap();
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
        next_consensus: chain
            .get_consensus_address(&chain.settings().standby_validators)
            .unwrap(),
        witness: Witness::new(Vec::new(), vec![opcode::PUSHT]),
    };
    Block::new(header, all)
}

/// Chain at height 1 whose block 1 split the governing supply into
/// [`COINS`] outputs. Returns the chain and the split transaction.
pub fn test_chain() -> (Arc<Blockchain>, Transaction) {
    test_chain_on(Arc::new(MemoryStore::new()))
}

/// [`test_chain`] over a caller-supplied store.
pub fn test_chain_on(store: Arc<dyn Store>) -> (Arc<Blockchain>, Transaction) {
    let chain = chain_on(store, Arc::new(AcceptAllVerifier));
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
    assert_eq!(chain.height(), 1);
    (chain, split)
}

/// Spend output `index` of `split` to an address derived from `salt`.
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

pub fn pool_with(
    chain: Arc<Blockchain>,
    config: MempoolConfig,
    policy: Arc<dyn PolicyPlugin>,
) -> MemoryPool {
    MemoryPool::new(config, chain, policy)
}

pub fn test_pool() -> (MemoryPool, Transaction) {
    let (chain, split) = test_chain();
    (
        pool_with(chain, MempoolConfig::for_testing(), Arc::new(AcceptAllPolicy)),
        split,
    )
}
