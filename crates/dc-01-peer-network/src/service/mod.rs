//! Peer sessions and the local node that owns them.

pub mod events;
pub mod local_node;
pub mod queue;
pub mod remote_node;

pub use events::NetworkEvent;
pub use local_node::LocalNode;
pub use queue::OutboundQueue;
pub use remote_node::RemoteNode;
