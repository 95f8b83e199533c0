//! Hash functions for the bloom filter.
//!
//! Each of the `k` functions is 32-bit MurmurHash3 under its own seed:
//! `i * 0xFBA4C795 + tweak`.

use std::io::Cursor;

const SEED_STEP: u32 = 0xFBA4_C795;

/// 32-bit MurmurHash3 (x86 variant) of `element`.
pub fn murmur32(element: &[u8], seed: u32) -> u32 {
    // reading from an in-memory cursor cannot fail
    murmur3::murmur3_32(&mut Cursor::new(element), seed).unwrap_or(0)
}

/// Seeds of the `k` hash functions for `tweak`.
pub fn seeds(k: usize, tweak: u32) -> Vec<u32> {
    (0..k as u32)
        .map(|i| i.wrapping_mul(SEED_STEP).wrapping_add(tweak))
        .collect()
}

/// Bit positions `element` maps to in a filter of `m` bits.
pub fn positions<'a>(element: &[u8], seeds: &'a [u32], m: usize) -> impl Iterator<Item = usize> + 'a {
    let element = element.to_vec();
    seeds
        .iter()
        .map(move |seed| murmur32(&element, *seed) as usize % m)
}
