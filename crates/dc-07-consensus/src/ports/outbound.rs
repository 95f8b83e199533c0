//! Driven ports.

use dc_01_peer_network::InventoryItem;
use shared_types::UInt256;

/// Gossip towards the other validators.
pub trait ConsensusRelay: Send + Sync {
    /// Admit `item` locally and announce it. `false` when it was refused.
    fn relay(&self, item: InventoryItem) -> bool;

    /// Ask peers for transactions a proposal references but we lack.
    fn request_transactions(&self, hashes: &[UInt256]);

    /// Ask peers for their memory pools.
    fn synchronize_memory_pool(&self);
}

/// Unix time in seconds, the resolution block timestamps carry.
pub trait Clock: Send + Sync {
    fn now(&self) -> u32;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u32 {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        u32::try_from(secs).unwrap_or(u32::MAX)
    }
}
