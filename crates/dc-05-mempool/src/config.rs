//! Memory pool configuration.

use dc_02_ledger::ProtocolSettings;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Transactions kept before the lowest fee per byte is evicted.
    pub capacity: usize,
    /// A persist this long after the previous one re-verifies the whole pool.
    pub reverify_threshold: Duration,
    /// How long a relayed hash suppresses repeats.
    pub known_hash_ttl: Duration,
    /// Known hashes kept before expired entries are swept.
    pub known_hash_capacity: usize,
    /// Upper bound on transactions a primary proposes, miner included.
    pub max_transactions_per_block: usize,
    /// Low-priority transactions larger than this are refused.
    pub max_free_transaction_size: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            capacity: 50_000,
            reverify_threshold: Duration::from_secs(10),
            known_hash_ttl: Duration::from_secs(30),
            known_hash_capacity: 1_000_000,
            max_transactions_per_block: 500,
            max_free_transaction_size: 1024,
        }
    }
}

impl MempoolConfig {
    /// Defaults with the capacity the network agreed on.
    pub fn from_settings(settings: &ProtocolSettings) -> Self {
        Self {
            capacity: settings.memory_pool_max_transactions,
            ..Self::default()
        }
    }

    /// Small pool that re-verifies on every persist.
    pub fn for_testing() -> Self {
        Self {
            capacity: 16,
            reverify_threshold: Duration::ZERO,
            known_hash_ttl: Duration::from_millis(200),
            known_hash_capacity: 64,
            max_transactions_per_block: 8,
            ..Self::default()
        }
    }
}
