//! Fee-based admission and packing policy.

use crate::config::MempoolConfig;
use crate::domain::fee_per_byte;
use dc_02_ledger::{Blockchain, PolicyPlugin, Snapshot, Transaction};
use shared_types::{Fixed8, Serializable};
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::debug;

/// Refuses large free transactions and packs blocks by fee per byte.
///
/// A transaction is free (low priority) when its network fee is below the
/// protocol's `low_priority_threshold`. Paid transactions are proposed
/// first; free ones fill what is left, up to
/// `max_free_transactions_per_block`.
pub struct FeePolicy {
    chain: Arc<Blockchain>,
    config: MempoolConfig,
}

impl FeePolicy {
    pub fn new(chain: Arc<Blockchain>, config: MempoolConfig) -> Self {
        Self { chain, config }
    }

    /// Fee of `tx`; zero when its inputs are not yet on chain.
    fn network_fee(&self, tx: &Transaction, snapshot: &Snapshot) -> Fixed8 {
        tx.network_fee(snapshot).unwrap_or(Fixed8::ZERO)
    }
}

impl PolicyPlugin for FeePolicy {
    fn filter_for_memory_pool(&self, tx: &Transaction) -> bool {
        let size = tx.size();
        if size <= self.config.max_free_transaction_size {
            return true;
        }
        let fee = self.network_fee(tx, &self.chain.snapshot());
        let accepted = fee >= self.chain.settings().low_priority_threshold;
        if !accepted {
            debug!(tx = %tx.hash(), size, "Free transaction too large for the pool");
        }
        accepted
    }

    fn filter_for_block(&self, transactions: Vec<Transaction>) -> Vec<Transaction> {
        let snapshot = self.chain.snapshot();
        let settings = self.chain.settings();
        let mut ranked: Vec<(Fixed8, Fixed8, Transaction)> = transactions
            .into_iter()
            .map(|tx| {
                let fee = self.network_fee(&tx, &snapshot);
                (fee_per_byte(fee, tx.size()), fee, tx)
            })
            .collect();
        ranked.sort_by_key(|(rate, fee, tx)| (Reverse(*rate), Reverse(*fee), tx.hash()));

        // one slot stays free for the miner transaction
        let budget = self.config.max_transactions_per_block.saturating_sub(1);
        let (free, paid): (Vec<_>, Vec<_>) = ranked
            .into_iter()
            .partition(|(_, fee, _)| *fee < settings.low_priority_threshold);
        let paid: Vec<Transaction> = paid.into_iter().take(budget).map(|(_, _, tx)| tx).collect();
        let free_slots = budget
            .saturating_sub(paid.len())
            .min(settings.max_free_transactions_per_block);
        paid.into_iter()
            .chain(free.into_iter().take(free_slots).map(|(_, _, tx)| tx))
            .collect()
    }
}
