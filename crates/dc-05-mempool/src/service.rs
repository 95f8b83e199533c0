//! # Memory Pool Service
//!
//! ## Admission paths
//!
//! ```text
//! add_transaction(tx)   local submission; verified inline under the
//!                       persist lock, then inserted
//! stage(tx)             transaction from a peer; parked in the staging
//!                       pool and picked up by process_staged
//! ```
//!
//! `process_staged` verifies a whole batch in parallel without holding the
//! persist lock. The batch is bound to the persist token it started under:
//! if a block is persisted meanwhile the token is cancelled and the batch
//! goes back to the staging pool instead of being committed against a
//! stale tip.
//!
//! Lock order is always persist lock, then pool, then staging pool.

use crate::config::MempoolConfig;
use crate::domain::{MempoolError, MempoolResult, PoolEntry, TransactionPool};
use dc_02_ledger::{Block, Blockchain, LedgerEvent, PolicyPlugin, Transaction};
use parking_lot::Mutex;
use rayon::prelude::*;
use shared_bus::{BusEvent, EventPublisher, InMemoryEventBus, Subscription};
use shared_types::UInt256;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub enum MempoolEvent {
    /// Newly verified transactions, ready to be relayed.
    TransactionsAdded { transactions: Vec<Arc<Transaction>> },
}

impl BusEvent for MempoolEvent {
    fn topic(&self) -> &'static str {
        match self {
            MempoolEvent::TransactionsAdded { .. } => "mempool.transactions_added",
        }
    }
}

/// Outcome of one `process_staged` pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub added: Vec<UInt256>,
    pub rejected: usize,
    /// Returned to staging because a block was persisted mid-batch.
    pub requeued: usize,
    /// Dropped because the ledger could not be read for them.
    pub failed: Vec<UInt256>,
}

pub struct MemoryPool {
    config: MempoolConfig,
    chain: Arc<Blockchain>,
    policy: Arc<dyn PolicyPlugin>,
    pool: Mutex<TransactionPool>,
    staged: Mutex<HashMap<UInt256, Transaction>>,
    last_persist: Mutex<Instant>,
    staged_signal: Notify,
    events: InMemoryEventBus<MempoolEvent>,
}

impl MemoryPool {
    pub fn new(config: MempoolConfig, chain: Arc<Blockchain>, policy: Arc<dyn PolicyPlugin>) -> Self {
        Self {
            pool: Mutex::new(TransactionPool::new(config.capacity)),
            config,
            chain,
            policy,
            staged: Mutex::new(HashMap::new()),
            last_persist: Mutex::new(Instant::now()),
            staged_signal: Notify::new(),
            events: InMemoryEventBus::new(),
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<Blockchain> {
        &self.chain
    }

    pub fn policy(&self) -> &Arc<dyn PolicyPlugin> {
        &self.policy
    }

    pub fn subscribe(&self) -> Subscription<MempoolEvent> {
        self.events.subscribe()
    }

    /// Verify `tx` against the tip and the pool, then insert it.
    pub fn add_transaction(&self, tx: Transaction) -> MempoolResult<()> {
        let hash = tx.hash();
        if tx.is_miner() {
            return Err(MempoolError::NotPoolable(hash));
        }
        if !self.policy.filter_for_memory_pool(&tx) {
            return Err(MempoolError::PolicyRejected(hash));
        }

        let evicted = {
            let _persist = self.chain.lock_persist();
            let mut pool = self.pool.lock();
            if pool.contains(&hash) {
                return Err(MempoolError::AlreadyPooled(hash));
            }
            if self.chain.contains_transaction(&hash)? {
                return Err(MempoolError::AlreadyOnChain(hash));
            }
            let snapshot = self.chain.snapshot();
            let verified = {
                let others: Vec<&Transaction> =
                    pool.entries().map(|e| e.transaction.as_ref()).collect();
                tx.verify(&snapshot, &others, self.chain.verifier().as_ref())
            };
            if !verified {
                return Err(MempoolError::VerificationFailed(hash));
            }
            let fee = tx.network_fee(&snapshot)?;
            let tx = Arc::new(tx);
            let evicted = pool.insert(PoolEntry::new(Arc::clone(&tx), fee));
            if !evicted.contains(&hash) {
                self.publish(vec![tx]);
            }
            evicted
        };
        self.log_evicted(&evicted);
        if evicted.contains(&hash) {
            return Err(MempoolError::Outbid(hash));
        }
        debug!(tx = %hash, "Transaction added to memory pool");
        Ok(())
    }

    /// Park a transaction received from a peer for batch verification.
    /// False when it is already pooled or staged.
    pub fn stage(&self, tx: Transaction) -> bool {
        let hash = tx.hash();
        if tx.is_miner() || self.pool.lock().contains(&hash) {
            return false;
        }
        let fresh = {
            let mut staged = self.staged.lock();
            match staged.entry(hash) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(tx);
                    true
                }
            }
        };
        if fresh {
            self.staged_signal.notify_one();
        }
        fresh
    }

    /// A staged transaction, not yet verified.
    pub fn get_staged(&self, hash: &UInt256) -> Option<Transaction> {
        self.staged.lock().get(hash).cloned()
    }

    pub fn staged_count(&self) -> usize {
        self.staged.lock().len()
    }

    /// Verify every staged transaction in parallel and commit the ones that
    /// pass. A transaction whose ledger reads fail is dropped on its own and
    /// listed in [`BatchOutcome::failed`]; the rest of the batch carries on.
    pub fn process_staged(&self) -> BatchOutcome {
        let batch: Vec<Transaction> = self.staged.lock().drain().map(|(_, tx)| tx).collect();
        let mut outcome = BatchOutcome::default();
        if batch.is_empty() {
            return outcome;
        }

        let (token, snapshot) = {
            let _persist = self.chain.lock_persist();
            (self.chain.persist_token(), self.chain.snapshot())
        };
        let (batch, pooled) = {
            let pool = self.pool.lock();
            let mut fresh = Vec::with_capacity(batch.len());
            for tx in batch {
                let hash = tx.hash();
                if pool.contains(&hash) {
                    continue;
                }
                match self.chain.contains_transaction(&hash) {
                    Ok(true) => {}
                    Ok(false) => fresh.push(tx),
                    Err(error) => {
                        warn!(tx = %hash, %error, "Ledger lookup failed, staged transaction dropped");
                        outcome.failed.push(hash);
                    }
                }
            }
            let pooled: Vec<Arc<Transaction>> =
                pool.entries().map(|e| Arc::clone(&e.transaction)).collect();
            (fresh, pooled)
        };
        if batch.is_empty() {
            return outcome;
        }

        let context: Vec<&Transaction> = pooled
            .iter()
            .map(Arc::as_ref)
            .chain(batch.iter())
            .collect();
        let verifier = self.chain.verifier();
        let verdicts: Vec<bool> = batch
            .par_iter()
            .map(|tx| {
                !token.is_cancelled()
                    && self.policy.filter_for_memory_pool(tx)
                    && tx.verify(&snapshot, &context, verifier.as_ref())
            })
            .collect();

        let mut added = Vec::new();
        let mut evicted = Vec::new();
        {
            let _persist = self.chain.lock_persist();
            if token.is_cancelled() {
                outcome.requeued = batch.len();
                self.requeue(batch);
                debug!(requeued = outcome.requeued, "Block persisted during verification, batch requeued");
                return outcome;
            }
            let mut pool = self.pool.lock();
            let mut spent: HashSet<_> = pool
                .entries()
                .flat_map(|e| e.transaction.inputs().iter().copied())
                .collect();
            for (tx, passed) in batch.into_iter().zip(verdicts) {
                if !passed || pool.contains(&tx.hash()) {
                    outcome.rejected += 1;
                    continue;
                }
                // the pool may have gained a conflicting transaction meanwhile
                if tx.inputs().iter().any(|input| spent.contains(input)) {
                    outcome.rejected += 1;
                    continue;
                }
                let fee = match tx.network_fee(&snapshot) {
                    Ok(fee) => fee,
                    Err(error) => {
                        warn!(tx = %tx.hash(), %error, "Fee lookup failed, staged transaction dropped");
                        outcome.failed.push(tx.hash());
                        continue;
                    }
                };
                spent.extend(tx.inputs().iter().copied());
                let tx = Arc::new(tx);
                evicted.extend(pool.insert(PoolEntry::new(Arc::clone(&tx), fee)));
                added.push(tx);
            }
        }

        added.retain(|tx| !evicted.contains(&tx.hash()));
        self.log_evicted(&evicted);
        outcome.added = added.iter().map(|tx| tx.hash()).collect();
        if !added.is_empty() {
            info!(
                added = added.len(),
                rejected = outcome.rejected,
                failed = outcome.failed.len(),
                "Staged transactions verified"
            );
            self.publish(added);
        }
        outcome
    }

    fn requeue(&self, batch: Vec<Transaction>) {
        let mut staged = self.staged.lock();
        for tx in batch {
            staged.entry(tx.hash()).or_insert(tx);
        }
        drop(staged);
        self.staged_signal.notify_one();
    }

    /// Drop what `block` mined or spent. When the previous persist was at
    /// least `reverify_threshold` ago, everything left is moved back to
    /// staging and verified again against the new tip.
    pub fn on_persist_completed(&self, block: &Block) {
        let mined: HashSet<UInt256> = block.transactions.iter().map(Transaction::hash).collect();
        let spent: HashSet<_> = block
            .transactions
            .iter()
            .flat_map(|tx| tx.inputs().iter().copied())
            .collect();

        let reverify = {
            let mut last = self.last_persist.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed >= self.config.reverify_threshold
        };

        let (removed, remaining) = {
            let mut pool = self.pool.lock();
            let removed = pool.remove_where(|entry| {
                mined.contains(&entry.hash())
                    || entry.transaction.inputs().iter().any(|input| spent.contains(input))
            });
            let remaining = if reverify { pool.drain() } else { Vec::new() };
            (removed, remaining)
        };
        {
            let mut staged = self.staged.lock();
            staged.retain(|hash, _| !mined.contains(hash));
            for tx in remaining.iter() {
                staged
                    .entry(tx.hash())
                    .or_insert_with(|| tx.as_ref().clone());
            }
        }
        debug!(
            block_index = block.index(),
            removed,
            reverify = remaining.len(),
            "Memory pool updated for persisted block"
        );
        if !remaining.is_empty() {
            self.staged_signal.notify_one();
        }
    }

    /// Pooled transactions in no particular order.
    pub fn get_memory_pool(&self) -> Vec<Transaction> {
        self.pool
            .lock()
            .entries()
            .map(|e| e.transaction.as_ref().clone())
            .collect()
    }

    /// Transactions a primary should propose, as chosen by the policy.
    pub fn get_for_block(&self) -> Vec<Transaction> {
        let candidates: Vec<Transaction> = self
            .pool
            .lock()
            .by_priority()
            .map(|e| e.transaction.as_ref().clone())
            .collect();
        self.policy.filter_for_block(candidates)
    }

    pub fn contains(&self, hash: &UInt256) -> bool {
        self.pool.lock().contains(hash)
    }

    pub fn get(&self, hash: &UInt256) -> Option<Transaction> {
        self.pool
            .lock()
            .get(hash)
            .map(|e| e.transaction.as_ref().clone())
    }

    pub fn hashes(&self) -> Vec<UInt256> {
        self.pool.lock().hashes()
    }

    pub fn len(&self) -> usize {
        self.pool.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.lock().is_empty()
    }

    /// Follow ledger persists and drain the staging pool until `shutdown`.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut persisted = self.chain.subscribe();
        info!(capacity = self.config.capacity, "Memory pool started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = persisted.recv() => match event {
                    Some(LedgerEvent::PersistCompleted { block }) => {
                        self.on_persist_completed(&block);
                    }
                    None => {
                        warn!("Ledger event bus closed, memory pool stopping");
                        break;
                    }
                },
                _ = self.staged_signal.notified() => {
                    let pool = Arc::clone(&self);
                    if let Err(error) = tokio::task::spawn_blocking(move || pool.process_staged()).await {
                        warn!(%error, "Staged verification task panicked");
                    }
                }
            }
        }
        info!("Memory pool stopped");
    }

    fn publish(&self, transactions: Vec<Arc<Transaction>>) {
        self.events
            .publish(MempoolEvent::TransactionsAdded { transactions });
    }

    fn log_evicted(&self, evicted: &[UInt256]) {
        for hash in evicted {
            info!(tx = %hash, capacity = self.config.capacity, "Evicted lowest fee-per-byte transaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        chain_with, next_block, pool_with, spend, test_chain, test_chain_on, test_pool,
        FlakyStore, RejectAllVerifier,
    };
    use dc_02_ledger::AcceptAllPolicy;
    use num_bigint::BigInt;
    use std::time::Duration;

    #[test]
    fn test_add_transaction_publishes() {
        let (pool, split) = test_pool();
        let mut events = pool.subscribe();
        let tx = spend(&split, 0, 0xA0);
        pool.add_transaction(tx.clone()).unwrap();

        assert!(pool.contains(&tx.hash()));
        assert_eq!(pool.get(&tx.hash()), Some(tx.clone()));
        match events.try_recv().unwrap() {
            Some(MempoolEvent::TransactionsAdded { transactions }) => {
                assert_eq!(transactions.len(), 1);
                assert_eq!(transactions[0].hash(), tx.hash());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_add_transaction_rejections() {
        let (pool, split) = test_pool();
        let tx = spend(&split, 0, 0xA0);
        pool.add_transaction(tx.clone()).unwrap();

        assert!(matches!(
            pool.add_transaction(tx),
            Err(MempoolError::AlreadyPooled(_))
        ));
        assert!(matches!(
            pool.add_transaction(Transaction::miner(99, Vec::new())),
            Err(MempoolError::NotPoolable(_))
        ));
        assert!(matches!(
            pool.add_transaction(split.clone()),
            Err(MempoolError::AlreadyOnChain(_))
        ));
        // same coin, different recipient
        assert!(matches!(
            pool.add_transaction(spend(&split, 0, 0xB0)),
            Err(MempoolError::VerificationFailed(_))
        ));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_failed_witness_keeps_pool_empty() {
        let chain = chain_with(Arc::new(RejectAllVerifier));
        let genesis_tx = chain.get_block_by_height(0).unwrap().unwrap().transactions[0].clone();
        let pool = pool_with(chain, MempoolConfig::for_testing(), Arc::new(AcceptAllPolicy));
        let tx = Transaction::contract(
            vec![dc_02_ledger::CoinReference::new(genesis_tx.hash(), 0)],
            genesis_tx.outputs().to_vec(),
        );
        assert!(matches!(
            pool.add_transaction(tx),
            Err(MempoolError::VerificationFailed(_))
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_capacity_eviction_picks_smallest_signed_hash() {
        let (chain, split) = test_chain();
        let config = MempoolConfig {
            capacity: 3,
            ..MempoolConfig::for_testing()
        };
        let pool = pool_with(chain, config, Arc::new(AcceptAllPolicy));
        // no utility token moves, so every fee per byte is zero
        let txs: Vec<Transaction> = (0..4).map(|i| spend(&split, i, 0xC0)).collect();
        let loser = txs
            .iter()
            .map(Transaction::hash)
            .min_by_key(|h| BigInt::from_signed_bytes_le(h.as_bytes()))
            .unwrap();

        for tx in &txs {
            match pool.add_transaction(tx.clone()) {
                Ok(()) => {}
                Err(MempoolError::Outbid(hash)) => assert_eq!(hash, loser),
                Err(other) => panic!("unexpected rejection {other}"),
            }
        }
        assert_eq!(pool.len(), 3);
        assert!(!pool.contains(&loser));
        for tx in txs.iter().filter(|tx| tx.hash() != loser) {
            assert!(pool.contains(&tx.hash()));
        }
    }

    #[test]
    fn test_staged_batch_is_verified() {
        let (pool, split) = test_pool();
        let mut events = pool.subscribe();
        let txs: Vec<Transaction> = (0..3).map(|i| spend(&split, i, 0xD0)).collect();
        for tx in &txs {
            assert!(pool.stage(tx.clone()));
        }
        assert!(!pool.stage(txs[0].clone()));
        assert_eq!(pool.staged_count(), 3);

        let outcome = pool.process_staged();
        assert_eq!(outcome.added.len(), 3);
        assert_eq!(outcome.rejected, 0);
        assert_eq!(pool.staged_count(), 0);
        assert_eq!(pool.len(), 3);
        assert!(matches!(
            events.try_recv().unwrap(),
            Some(MempoolEvent::TransactionsAdded { transactions }) if transactions.len() == 3
        ));
        // already pooled
        assert!(!pool.stage(txs[1].clone()));
    }

    #[test]
    fn test_conflicting_staged_transactions_both_fail() {
        let (pool, split) = test_pool();
        pool.stage(spend(&split, 0, 0x01));
        pool.stage(spend(&split, 0, 0x02));
        pool.stage(spend(&split, 1, 0x03));
        let outcome = pool.process_staged();
        assert_eq!(outcome.added.len(), 1);
        assert_eq!(outcome.rejected, 2);
    }

    #[test]
    fn test_ledger_error_drops_only_the_failing_transaction() {
        let store = Arc::new(FlakyStore::default());
        let (chain, split) = test_chain_on(Arc::clone(&store) as Arc<dyn dc_03_state_cache::Store>);
        let pool = pool_with(chain, MempoolConfig::for_testing(), Arc::new(AcceptAllPolicy));
        let mut events = pool.subscribe();
        let txs: Vec<Transaction> = (0..3).map(|i| spend(&split, i, 0x50)).collect();
        for tx in &txs {
            pool.stage(tx.clone());
        }
        store.poison_transaction(&txs[1].hash());

        let outcome = pool.process_staged();
        assert_eq!(outcome.failed, vec![txs[1].hash()]);
        let mut added = outcome.added.clone();
        added.sort();
        let mut expected = vec![txs[0].hash(), txs[2].hash()];
        expected.sort();
        assert_eq!(added, expected);
        assert_eq!(outcome.rejected, 0);
        assert_eq!(pool.staged_count(), 0);
        assert!(!pool.contains(&txs[1].hash()));

        match events.try_recv().unwrap() {
            Some(MempoolEvent::TransactionsAdded { transactions }) => {
                let mut relayed: Vec<UInt256> = transactions.iter().map(|tx| tx.hash()).collect();
                relayed.sort();
                assert_eq!(relayed, expected);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    /// Persists a block the first time it is consulted, as if one arrived
    /// while the batch was being verified.
    struct PersistDuringVerify {
        chain: Arc<Blockchain>,
        block: Mutex<Option<Block>>,
    }

    impl PolicyPlugin for PersistDuringVerify {
        fn filter_for_memory_pool(&self, _tx: &Transaction) -> bool {
            if let Some(block) = self.block.lock().take() {
                self.chain.add_block(block).unwrap();
            }
            true
        }

        fn filter_for_block(&self, transactions: Vec<Transaction>) -> Vec<Transaction> {
            transactions
        }
    }

    #[test]
    fn test_batch_requeued_when_block_persists_mid_verify() {
        let (chain, split) = test_chain();
        let policy = Arc::new(PersistDuringVerify {
            block: Mutex::new(Some(next_block(&chain, Vec::new()))),
            chain: Arc::clone(&chain),
        });
        let pool = pool_with(Arc::clone(&chain), MempoolConfig::for_testing(), policy);
        let tx = spend(&split, 0, 0xE0);
        pool.stage(tx.clone());

        let first = pool.process_staged();
        assert_eq!(first.requeued, 1);
        assert!(first.added.is_empty());
        assert_eq!(chain.height(), 2);
        assert_eq!(pool.staged_count(), 1);

        let second = pool.process_staged();
        assert_eq!(second.added, vec![tx.hash()]);
    }

    #[test]
    fn test_persist_purges_and_reverifies() {
        let (pool, split) = test_pool();
        let mined = spend(&split, 0, 0x10);
        let kept = spend(&split, 1, 0x11);
        pool.add_transaction(mined.clone()).unwrap();
        pool.add_transaction(kept.clone()).unwrap();

        let block = next_block(pool.chain(), vec![mined.clone()]);
        pool.chain().add_block(block.clone()).unwrap();
        pool.on_persist_completed(&block);

        // threshold zero: everything left goes back through verification
        assert!(pool.is_empty());
        assert_eq!(pool.staged_count(), 1);
        let outcome = pool.process_staged();
        assert_eq!(outcome.added, vec![kept.hash()]);
        assert!(!pool.contains(&mined.hash()));
    }

    #[test]
    fn test_quick_persist_keeps_pool_but_drops_conflicts() {
        let (chain, split) = test_chain();
        let config = MempoolConfig {
            reverify_threshold: Duration::from_secs(3600),
            ..MempoolConfig::for_testing()
        };
        let pool = pool_with(Arc::clone(&chain), config, Arc::new(AcceptAllPolicy));
        let pooled = spend(&split, 0, 0x20);
        let untouched = spend(&split, 1, 0x21);
        pool.add_transaction(pooled.clone()).unwrap();
        pool.add_transaction(untouched.clone()).unwrap();

        // a different spend of coin 0 wins the block
        let rival = spend(&split, 0, 0x22);
        let block = next_block(&chain, vec![rival]);
        chain.add_block(block.clone()).unwrap();
        pool.on_persist_completed(&block);

        assert!(!pool.contains(&pooled.hash()));
        assert!(pool.contains(&untouched.hash()));
        assert_eq!(pool.staged_count(), 0);
    }

    #[test]
    fn test_get_for_block_goes_through_policy() {
        let (pool, split) = test_pool();
        for i in 0..3 {
            pool.add_transaction(spend(&split, i, 0x30)).unwrap();
        }
        let mut proposed: Vec<UInt256> = pool.get_for_block().iter().map(Transaction::hash).collect();
        let mut pooled = pool.hashes();
        proposed.sort();
        pooled.sort();
        assert_eq!(proposed, pooled);
        assert_eq!(pool.get_memory_pool().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_loop_follows_staging_and_persists() {
        let (pool, split) = test_pool();
        let pool = Arc::new(pool);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&pool).run(shutdown.clone()));

        let tx = spend(&split, 0, 0x40);
        pool.stage(tx.clone());
        tokio::time::timeout(Duration::from_secs(5), async {
            while !pool.contains(&tx.hash()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let block = next_block(pool.chain(), vec![tx.clone()]);
        pool.chain().add_block(block).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.contains(&tx.hash()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        task.await.unwrap();
    }
}
