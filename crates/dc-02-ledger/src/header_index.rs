//! In-memory list of header hashes by height, shared by the chain service
//! and every snapshot it hands out.

use parking_lot::RwLock;
use shared_types::UInt256;

#[derive(Debug, Default)]
pub struct HeaderIndex {
    hashes: RwLock<Vec<UInt256>>,
}

impl HeaderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known headers; the next header's index.
    pub fn len(&self) -> u32 {
        self.hashes.read().len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.read().is_empty()
    }

    pub fn get(&self, height: u32) -> Option<UInt256> {
        self.hashes.read().get(height as usize).copied()
    }

    pub fn last(&self) -> Option<UInt256> {
        self.hashes.read().last().copied()
    }

    pub fn push(&self, hash: UInt256) {
        self.hashes.write().push(hash);
    }

    pub fn extend<I: IntoIterator<Item = UInt256>>(&self, hashes: I) {
        self.hashes.write().extend(hashes);
    }

    /// Hashes in `[start, start + count)`, clipped to what is known.
    pub fn range(&self, start: u32, count: usize) -> Vec<UInt256> {
        let hashes = self.hashes.read();
        let start = (start as usize).min(hashes.len());
        let end = start.saturating_add(count).min(hashes.len());
        hashes[start..end].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_clips() {
        let index = HeaderIndex::new();
        index.extend((0..5u8).map(|i| UInt256::from([i; 32])));
        assert_eq!(index.len(), 5);
        assert_eq!(index.range(3, 10).len(), 2);
        assert!(index.range(9, 1).is_empty());
        assert_eq!(index.get(4), Some(UInt256::from([4; 32])));
        assert_eq!(index.get(5), None);
    }
}
