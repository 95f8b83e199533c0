//! Core bloom filter.
//!
//! Bits are numbered least-significant first within each byte, so the byte
//! form exchanged in `filterload` maps directly onto the bit array.
//!
//! No false negatives: once added, an element always checks true.

use bitvec::prelude::*;

use super::errors::{FilterError, FilterResult};
use super::hash_functions::{positions, seeds};

/// Largest filter a peer may load, in bytes.
pub const MAX_FILTER_SIZE: usize = 36_000;

/// Most hash functions a peer may request.
pub const MAX_HASH_FUNCTIONS: usize = 50;

/// Largest element a peer may add with `filteradd`.
pub const MAX_ELEMENT_SIZE: usize = 520;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BloomFilter {
    bits: BitVec<u8, Lsb0>,
    seeds: Vec<u32>,
    tweak: u32,
}

impl BloomFilter {
    /// Empty filter of `m` bits and `k` hash functions.
    pub fn new(m: usize, k: usize, tweak: u32) -> Self {
        Self {
            bits: bitvec![u8, Lsb0; 0; m],
            seeds: seeds(k, tweak),
            tweak,
        }
    }

    /// Filter over existing `elements` bytes, padded or truncated to `m` bits.
    pub fn with_bits(m: usize, k: usize, tweak: u32, elements: &[u8]) -> Self {
        let mut bits = BitVec::<u8, Lsb0>::from_slice(elements);
        bits.resize(m, false);
        Self {
            bits,
            seeds: seeds(k, tweak),
            tweak,
        }
    }

    /// Filter loaded by a peer; sized by its byte form and bounded by the
    /// protocol limits.
    pub fn load(filter: &[u8], k: usize, tweak: u32) -> FilterResult<Self> {
        if filter.len() > MAX_FILTER_SIZE {
            return Err(FilterError::FilterTooLarge {
                size: filter.len(),
                max: MAX_FILTER_SIZE,
            });
        }
        if k > MAX_HASH_FUNCTIONS {
            return Err(FilterError::TooManyHashFunctions {
                count: k,
                max: MAX_HASH_FUNCTIONS,
            });
        }
        if filter.is_empty() {
            return Err(FilterError::Empty);
        }
        Ok(Self::with_bits(filter.len() * 8, k, tweak, filter))
    }

    pub fn add(&mut self, element: &[u8]) {
        let m = self.bits.len();
        if m == 0 {
            return;
        }
        for position in positions(element, &self.seeds, m) {
            self.bits.set(position, true);
        }
    }

    /// Add an element sent by a peer.
    pub fn add_checked(&mut self, element: &[u8]) -> FilterResult<()> {
        if element.len() > MAX_ELEMENT_SIZE {
            return Err(FilterError::ElementTooLarge {
                size: element.len(),
                max: MAX_ELEMENT_SIZE,
            });
        }
        self.add(element);
        Ok(())
    }

    /// True if `element` may have been added; false means it never was.
    pub fn check(&self, element: &[u8]) -> bool {
        let m = self.bits.len();
        m > 0 && positions(element, &self.seeds, m).all(|position| self.bits[position])
    }

    /// Byte form of the bit array.
    pub fn bits(&self) -> Vec<u8> {
        self.bits.as_raw_slice().to_vec()
    }

    pub fn size_bits(&self) -> usize {
        self.bits.len()
    }

    pub fn hash_count(&self) -> usize {
        self.seeds.len()
    }

    pub fn tweak(&self) -> u32 {
        self.tweak
    }
}
