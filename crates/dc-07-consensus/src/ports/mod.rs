//! Ports: what the consensus service needs from the outside.

pub mod outbound;

pub use outbound::{Clock, ConsensusRelay, SystemClock};
