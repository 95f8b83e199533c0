//! # dc-03-state-cache
//!
//! Copy-on-write view of ledger state.
//!
//! ## Layers
//!
//! ```text
//! ┌──────────────────────────┐
//! │ snapshot.create_snapshot │  isolated overlay (script execution)
//! └────────────┬─────────────┘
//!              │ merge() on success only
//! ┌────────────▼─────────────┐
//! │ DataCache (db source)    │  one per record prefix, tracks Added/Changed/Deleted
//! └────────────┬─────────────┘
//!              │ commit_to(batch) → Store::write (single batch)
//! ┌────────────▼─────────────┐
//! │ Store (ordered KV)       │  external engine or MemoryStore
//! └──────────────────────────┘
//! ```
//!
//! Reads never mutate. Every mutation is tracked per key and becomes visible
//! to the layer below only through an explicit merge or commit.

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::MemoryStore;
pub use domain::*;
pub use ports::*;
