//! Consensus domain: the round context, its state flags and the messages
//! validators exchange.

pub mod context;
pub mod errors;
pub mod messages;
pub mod state;

pub use context::{primary_index, ConsensusContext, CONSENSUS_VERSION};
pub use errors::{ConsensusError, ConsensusResult};
pub use messages::{ConsensusMessage, MessageBody, MessageType, PrepareRequest};
pub use state::ConsensusState;
