//! In-flight inventory requests.
//!
//! A hash announced by several peers is fetched from the first one only.
//! The global set records every hash some peer has been asked for; each
//! peer tracks its own share so a stalled peer can be detected and its
//! share released when it goes away.

use shared_types::UInt256;
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct Missions {
    global: HashSet<UInt256>,
}

impl Missions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the hashes no peer is fetching yet and return them.
    pub fn claim<I>(&mut self, hashes: I) -> Vec<UInt256>
    where
        I: IntoIterator<Item = UInt256>,
    {
        hashes
            .into_iter()
            .filter(|hash| self.global.insert(*hash))
            .collect()
    }

    pub fn complete(&mut self, hash: &UInt256) {
        self.global.remove(hash);
    }

    pub fn release<'a, I>(&mut self, hashes: I)
    where
        I: IntoIterator<Item = &'a UInt256>,
    {
        for hash in hashes {
            self.global.remove(hash);
        }
    }

    pub fn contains(&self, hash: &UInt256) -> bool {
        self.global.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty()
    }
}

/// One peer's outstanding requests and when it last made progress on them.
#[derive(Debug, Default)]
pub struct PeerMissions {
    hashes: HashSet<UInt256>,
    started: Option<Instant>,
}

impl PeerMissions {
    pub fn add(&mut self, hashes: &[UInt256], now: Instant) {
        if self.hashes.is_empty() && !hashes.is_empty() {
            self.started = Some(now);
        }
        self.hashes.extend(hashes.iter().copied());
    }

    /// Mark `hash` delivered. Any delivery restarts the stall clock.
    pub fn complete(&mut self, hash: &UInt256, now: Instant) -> bool {
        let removed = self.hashes.remove(hash);
        self.started = if self.hashes.is_empty() {
            None
        } else {
            Some(now)
        };
        removed
    }

    /// Outstanding for longer than `limit` without any delivery.
    pub fn is_stalled(&self, now: Instant, limit: Duration) -> bool {
        self.started
            .is_some_and(|started| now.saturating_duration_since(started) > limit)
    }

    pub fn contains(&self, hash: &UInt256) -> bool {
        self.hashes.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn drain(&mut self) -> Vec<UInt256> {
        self.started = None;
        self.hashes.drain().collect()
    }
}
