//! # dc-07-consensus
//!
//! Delegated byzantine fault tolerance among a fixed validator set.
//!
//! ## Architecture
//!
//! - **Domain** (`domain/`): [`ConsensusContext`] (one round's state),
//!   [`ConsensusState`] flags and the three [`ConsensusMessage`] kinds
//! - **Ports** (`ports/`): [`ConsensusRelay`] for gossip and [`Clock`] for
//!   block timestamps
//! - **Adapters** (`adapters/`): the peer network's `LocalNode` as the relay
//! - **Service** (`service/`): [`ConsensusService`], the round state machine
//!   behind one coarse lock, plus its timer loop
//!
//! ## Round
//!
//! | Step | Who | Sends |
//! |------|-----|-------|
//! | timer fires | primary `(h - v) mod n` | `PrepareRequest` with its signature |
//! | proposal complete and valid | backup | `PrepareResponse` |
//! | `m = n - (n - 1) / 3` signatures | anyone | the block |
//! | timeout or bad proposal | anyone | `ChangeView` to `v + 1` |

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::ConsensusConfig;
pub use domain::{
    primary_index, ConsensusContext, ConsensusError, ConsensusMessage, ConsensusResult,
    ConsensusState, MessageBody, MessageType, PrepareRequest,
};
pub use ports::{Clock, ConsensusRelay, SystemClock};
pub use service::{ConsensusDependencies, ConsensusEvent, ConsensusService, Timer};
