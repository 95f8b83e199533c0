//! # dc-06-bloom-filters
//!
//! Bloom filters loaded by light peers with `filterload`, and the rules
//! that decide which transactions a filter selects. A node holding a peer's
//! filter relays only matching transactions to it and answers block
//! requests with merkle blocks flagged by [`match_flags`].
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): pure filter logic, no I/O
//!   - `BloomFilter`: murmur3 bit array with a per-filter tweak
//!   - `matching`: transaction and block matching

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;

pub use domain::*;
