//! Expiring set of recently relayed inventory hashes.

use shared_types::UInt256;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Suppresses a hash for `ttl` after it was last admitted.
///
/// Once the set grows past `capacity`, expired entries are swept on the
/// next insert. Live entries are never dropped, so a flood of fresh hashes
/// may hold the set above capacity until they expire.
#[derive(Debug)]
pub struct KnownHashes {
    ttl: Duration,
    capacity: usize,
    seen: HashMap<UInt256, Instant>,
}

impl KnownHashes {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            seen: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Whether `hash` was admitted within the last `ttl`.
    pub fn contains(&self, hash: &UInt256, now: Instant) -> bool {
        self.seen
            .get(hash)
            .is_some_and(|at| now.saturating_duration_since(*at) <= self.ttl)
    }

    /// Admit `hash` unless it is still live. Returns false for a repeat.
    pub fn try_add(&mut self, hash: UInt256, now: Instant) -> bool {
        if self.contains(&hash, now) {
            return false;
        }
        self.seen.insert(hash, now);
        if self.seen.len() > self.capacity {
            let ttl = self.ttl;
            self.seen
                .retain(|_, at| now.saturating_duration_since(*at) <= ttl);
        }
        true
    }

    /// Forget `hash` so the next relay of it is admitted again.
    pub fn remove(&mut self, hash: &UInt256) {
        self.seen.remove(hash);
    }
}
