//! Events the consensus service publishes.

use shared_bus::BusEvent;
use shared_types::UInt256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusEvent {
    /// A round began, either at a new height (view 0) or after a view change.
    RoundStarted { block_index: u32, view_number: u8 },
    /// This node asked to move to `new_view`.
    ChangeViewRequested { block_index: u32, new_view: u8 },
    /// Enough signatures were collected and the block was handed to the relay.
    BlockSent { block_index: u32, hash: UInt256 },
}

impl BusEvent for ConsensusEvent {
    fn topic(&self) -> &'static str {
        match self {
            Self::RoundStarted { .. } => "consensus.round_started",
            Self::ChangeViewRequested { .. } => "consensus.change_view_requested",
            Self::BlockSent { .. } => "consensus.block_sent",
        }
    }
}
