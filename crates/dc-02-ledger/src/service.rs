//! # Blockchain Service
//!
//! Owns the header index and the persist pipeline.
//!
//! ## Block admission
//!
//! ```text
//! add_block(b)
//!   b.index <= height               → AlreadyExists
//!   b.index >  header count         → parked until its header is next
//!   b.index == header count         → header verified, appended
//!   b.index <  header count         → hash must match the indexed header
//!   then: cached, and every consecutive cached block is persisted
//! ```
//!
//! All mutation happens under the persist lock. Each persist cancels the
//! previous [`CancellationToken`] first, so work that read the old tip
//! (mempool verification) can stop early.

use crate::config::ProtocolSettings;
use crate::domain::{
    genesis, validators, Block, BlockState, CoinReference, HashIndexState, Header,
    HeaderHashList, HeightKey, LedgerError, Transaction, TrimmedBlock,
};
use crate::header_index::HeaderIndex;
use crate::ports::{ContractExecutor, WitnessVerifier};
use crate::snapshot::Snapshot;
use crate::verification;
use crate::LedgerResult;
use dc_03_state_cache::Store;
use parking_lot::{Mutex, MutexGuard, RwLock};
use shared_bus::{BusEvent, EventPublisher, InMemoryEventBus, Subscription};
use shared_crypto::PublicKey;
use shared_types::{Fixed8, UInt160, UInt256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Blocks parked ahead of the header index.
const MAX_UNVERIFIED_BLOCKS: usize = 10_000;

#[derive(Debug, Clone)]
pub enum LedgerEvent {
    /// `block` is committed and is the new tip.
    PersistCompleted { block: Arc<Block> },
}

impl BusEvent for LedgerEvent {
    fn topic(&self) -> &'static str {
        match self {
            LedgerEvent::PersistCompleted { .. } => "ledger.persist_completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddBlockResult {
    AlreadyExists,
    /// Held until the headers before it are known.
    Cached,
    Invalid,
    Accepted,
}

pub struct Blockchain {
    settings: Arc<ProtocolSettings>,
    store: Arc<dyn Store>,
    verifier: Arc<dyn WitnessVerifier>,
    executor: Arc<dyn ContractExecutor>,
    header_index: Arc<HeaderIndex>,
    /// Header hashes already written as `HeaderHashList` batches.
    stored_header_count: Mutex<u32>,
    block_height: RwLock<Option<u32>>,
    block_cache: Mutex<HashMap<UInt256, Block>>,
    unverified: Mutex<BTreeMap<u32, Block>>,
    persist_lock: Mutex<()>,
    persist_token: Mutex<CancellationToken>,
    events: InMemoryEventBus<LedgerEvent>,
}

impl Blockchain {
    /// Open the chain in `store`, persisting the genesis block when the
    /// store is empty and rebuilding the header index otherwise.
    pub fn new(
        settings: ProtocolSettings,
        store: Arc<dyn Store>,
        verifier: Arc<dyn WitnessVerifier>,
        executor: Arc<dyn ContractExecutor>,
    ) -> LedgerResult<Self> {
        if settings.standby_validators.is_empty() {
            return Err(LedgerError::Genesis("no standby validators".into()));
        }
        let chain = Self {
            settings: Arc::new(settings),
            store,
            verifier,
            executor,
            header_index: Arc::new(HeaderIndex::new()),
            stored_header_count: Mutex::new(0),
            block_height: RwLock::new(None),
            block_cache: Mutex::new(HashMap::new()),
            unverified: Mutex::new(BTreeMap::new()),
            persist_lock: Mutex::new(()),
            persist_token: Mutex::new(CancellationToken::new()),
            events: InMemoryEventBus::new(),
        };
        let snapshot = chain.snapshot();
        match snapshot.height() {
            None => {
                let genesis = genesis::genesis_block(&chain.settings)?;
                info!(hash = %genesis.hash(), "Initializing chain with genesis block");
                let _guard = chain.persist_lock.lock();
                chain.persist(&genesis)?;
            }
            Some(height) => {
                chain.load_header_index(&snapshot)?;
                *chain.block_height.write() = Some(height);
                info!(
                    height,
                    headers = chain.header_index.len(),
                    "Loaded chain from store"
                );
            }
        }
        Ok(chain)
    }

    fn load_header_index(&self, snapshot: &Snapshot) -> LedgerResult<()> {
        let mut stored = self.stored_header_count.lock();
        for (key, list) in snapshot.header_hash_list.find(&[])? {
            if key.0 != self.header_index.len() {
                warn!(start = key.0, "Header hash list out of sequence, ignoring the rest");
                break;
            }
            *stored += list.hashes.len() as u32;
            self.header_index.extend(list.hashes);
        }
        let current = snapshot.header_hash_index.get()?;
        let mut tail = Vec::new();
        let mut hash = current.hash;
        let mut index = current.index;
        while index != u32::MAX && index >= self.header_index.len() {
            tail.push(hash);
            if index == 0 {
                break;
            }
            let header = snapshot
                .get_header(&hash)?
                .ok_or(LedgerError::UnknownHeader(hash))?;
            hash = header.prev_hash;
            index -= 1;
        }
        tail.reverse();
        self.header_index.extend(tail);
        Ok(())
    }

    pub fn settings(&self) -> &Arc<ProtocolSettings> {
        &self.settings
    }

    pub fn verifier(&self) -> &Arc<dyn WitnessVerifier> {
        &self.verifier
    }

    pub fn header_index(&self) -> &Arc<HeaderIndex> {
        &self.header_index
    }

    /// Fresh read view of the committed state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.store.snapshot(),
            Arc::clone(&self.settings),
            Arc::clone(&self.header_index),
        )
    }

    /// Held while a block is being persisted. The memory pool nests its
    /// own lock under this one.
    pub fn lock_persist(&self) -> MutexGuard<'_, ()> {
        self.persist_lock.lock()
    }

    /// Token cancelled when the next persist starts.
    pub fn persist_token(&self) -> CancellationToken {
        self.persist_token.lock().clone()
    }

    pub fn subscribe(&self) -> Subscription<LedgerEvent> {
        self.events.subscribe()
    }

    pub fn height(&self) -> u32 {
        self.block_height.read().unwrap_or(0)
    }

    pub fn header_height(&self) -> u32 {
        self.header_index.len().saturating_sub(1)
    }

    pub fn current_block_hash(&self) -> UInt256 {
        self.header_index.get(self.height()).unwrap_or(UInt256::ZERO)
    }

    pub fn current_header_hash(&self) -> UInt256 {
        self.header_index.last().unwrap_or(UInt256::ZERO)
    }

    pub fn get_block_hash(&self, height: u32) -> Option<UInt256> {
        self.header_index.get(height)
    }

    pub fn get_block(&self, hash: &UInt256) -> LedgerResult<Option<Block>> {
        if let Some(block) = self.block_cache.lock().get(hash) {
            return Ok(Some(block.clone()));
        }
        self.snapshot().get_block(hash)
    }

    pub fn get_block_by_height(&self, height: u32) -> LedgerResult<Option<Block>> {
        match self.get_block_hash(height) {
            Some(hash) => self.get_block(&hash),
            None => Ok(None),
        }
    }

    pub fn get_header(&self, hash: &UInt256) -> LedgerResult<Option<Header>> {
        if let Some(block) = self.block_cache.lock().get(hash) {
            return Ok(Some(block.header.clone()));
        }
        self.snapshot().get_header(hash)
    }

    pub fn get_header_by_height(&self, height: u32) -> LedgerResult<Option<Header>> {
        match self.get_block_hash(height) {
            Some(hash) => self.get_header(&hash),
            None => Ok(None),
        }
    }

    pub fn contains_block(&self, hash: &UInt256) -> LedgerResult<bool> {
        if self.block_cache.lock().contains_key(hash) {
            return Ok(true);
        }
        self.snapshot().contains_block(hash)
    }

    pub fn get_transaction(&self, hash: &UInt256) -> LedgerResult<Option<Transaction>> {
        self.snapshot().get_transaction(hash)
    }

    pub fn contains_transaction(&self, hash: &UInt256) -> LedgerResult<bool> {
        self.snapshot().contains_transaction(hash)
    }

    pub fn get_sys_fee_amount(&self, height: u32) -> LedgerResult<i64> {
        self.snapshot().get_sys_fee_amount(height)
    }

    pub fn calculate_bonus(&self, claims: &[CoinReference], ignore_claimed: bool) -> LedgerResult<Fixed8> {
        self.snapshot().calculate_bonus(claims, ignore_claimed)
    }

    pub fn calculate_net_fee(&self, transactions: &[Transaction]) -> LedgerResult<Fixed8> {
        verification::calculate_net_fee(transactions, &self.snapshot())
    }

    /// Validators elected by the state as of the current tip.
    pub fn get_validators(&self) -> LedgerResult<Vec<PublicKey>> {
        self.snapshot().get_validators()
    }

    /// Validators for the block after the tip once `pending` is included.
    pub fn get_next_block_validators(&self, pending: &[Transaction]) -> LedgerResult<Vec<PublicKey>> {
        self.snapshot().get_validators_with(pending)
    }

    pub fn get_consensus_address(&self, validators: &[PublicKey]) -> LedgerResult<UInt160> {
        validators::consensus_address(validators)
    }

    /// Ledger rules and witnesses of `tx` against the tip and `mempool`.
    pub fn verify_transaction(&self, tx: &Transaction, mempool: &[&Transaction]) -> bool {
        tx.verify(&self.snapshot(), mempool, self.verifier.as_ref())
    }

    pub fn add_block(&self, block: Block) -> LedgerResult<AddBlockResult> {
        let _guard = self.persist_lock.lock();
        let result = self.admit_block(block)?;
        if result == AddBlockResult::Accepted {
            self.persist_cached()?;
        }
        Ok(result)
    }

    fn admit_block(&self, block: Block) -> LedgerResult<AddBlockResult> {
        let index = block.index();
        let hash = block.hash();
        if self.block_height.read().is_some_and(|h| index <= h)
            || self.block_cache.lock().contains_key(&hash)
        {
            return Ok(AddBlockResult::AlreadyExists);
        }
        let next_header = self.header_index.len();
        if index > next_header {
            let mut unverified = self.unverified.lock();
            if unverified.len() >= MAX_UNVERIFIED_BLOCKS {
                debug!(block_index = index, "Unverified block cache full, dropping block");
                return Ok(AddBlockResult::Invalid);
            }
            unverified.insert(index, block);
            return Ok(AddBlockResult::Cached);
        }
        if index == next_header {
            let mut snapshot = self.snapshot();
            if self.settings.verify_blocks && !block.verify(&snapshot, self.verifier.as_ref()) {
                debug!(block_index = index, %hash, "Block header failed verification");
                return Ok(AddBlockResult::Invalid);
            }
            self.append_header(&mut snapshot, &block.header)?;
            self.save_header_hash_lists(&mut snapshot)?;
            snapshot.commit(self.store.as_ref())?;
        } else if self.header_index.get(index) != Some(hash) {
            debug!(block_index = index, %hash, "Block does not match the indexed header");
            return Ok(AddBlockResult::Invalid);
        }
        self.block_cache.lock().insert(hash, block);
        Ok(AddBlockResult::Accepted)
    }

    /// Index and store consecutive `headers`. Stops at the first gap or
    /// failed check. Returns how many were added.
    pub fn add_headers(&self, headers: Vec<Header>) -> LedgerResult<usize> {
        let _guard = self.persist_lock.lock();
        let mut snapshot = self.snapshot();
        let mut added = 0;
        for header in &headers {
            let next = self.header_index.len();
            if header.index < next {
                continue;
            }
            if header.index > next {
                break;
            }
            if self.settings.verify_blocks && !header.verify(&snapshot, self.verifier.as_ref()) {
                debug!(index = header.index, "Header failed verification");
                break;
            }
            self.append_header(&mut snapshot, header)?;
            added += 1;
        }
        if added > 0 {
            self.save_header_hash_lists(&mut snapshot)?;
            snapshot.commit(self.store.as_ref())?;
            info!(added, header_height = self.header_height(), "Headers added");
            self.persist_cached()?;
        }
        Ok(added)
    }

    fn append_header(&self, snapshot: &mut Snapshot, header: &Header) -> LedgerResult<()> {
        let hash = header.hash();
        if !snapshot.blocks.contains(&hash)? {
            snapshot.blocks.add(
                hash,
                BlockState {
                    system_fee_amount: 0,
                    trimmed_block: TrimmedBlock::header_only(header.clone()),
                },
            )?;
        }
        self.header_index.push(hash);
        *snapshot.header_hash_index.get_and_change()? = HashIndexState {
            hash,
            index: header.index,
        };
        Ok(())
    }

    fn save_header_hash_lists(&self, snapshot: &mut Snapshot) -> LedgerResult<()> {
        let batch = HeaderHashList::BATCH as u32;
        let mut stored = self.stored_header_count.lock();
        while self.header_index.len() - *stored >= batch {
            let hashes = self.header_index.range(*stored, HeaderHashList::BATCH);
            snapshot
                .header_hash_list
                .add(HeightKey(*stored), HeaderHashList { hashes })?;
            *stored += batch;
        }
        Ok(())
    }

    /// Persist every cached block that extends the tip, pulling parked
    /// blocks in as the header index reaches them.
    fn persist_cached(&self) -> LedgerResult<()> {
        loop {
            let next = self.block_height.read().map_or(0, |h| h + 1);
            let ready = self
                .header_index
                .get(next)
                .and_then(|hash| self.block_cache.lock().remove(&hash));
            if let Some(block) = ready {
                self.persist(&block)?;
                continue;
            }
            let parked = self.unverified.lock().remove(&self.header_index.len());
            match parked {
                Some(block) => {
                    self.admit_block(block)?;
                }
                None => return Ok(()),
            }
        }
    }

    /// Caller holds the persist lock.
    fn persist(&self, block: &Block) -> LedgerResult<()> {
        {
            let mut token = self.persist_token.lock();
            token.cancel();
            *token = CancellationToken::new();
        }
        let mut snapshot = self.snapshot();
        snapshot.persist_block(block, self.executor.as_ref())?;
        let hash = block.hash();
        if block.index() == self.header_index.len() {
            self.header_index.push(hash);
            *snapshot.header_hash_index.get_and_change()? = HashIndexState {
                hash,
                index: block.index(),
            };
        }
        self.save_header_hash_lists(&mut snapshot)?;
        snapshot.commit(self.store.as_ref())?;
        *self.block_height.write() = Some(block.index());
        info!(
            block_index = block.index(),
            %hash,
            transactions = block.transactions.len(),
            "Block persisted"
        );
        self.events.publish(LedgerEvent::PersistCompleted {
            block: Arc::new(block.clone()),
        });
        Ok(())
    }
}
