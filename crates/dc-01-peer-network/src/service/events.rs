//! Events the network publishes for other components.

use crate::domain::InventoryItem;
use shared_bus::BusEvent;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// An item passed the relay gate, or the pool admitted a transaction.
    InventoryReceived { item: Arc<InventoryItem> },
    /// Handshake completed.
    PeerConnected { peer: SocketAddr, start_height: u32 },
    PeerDisconnected { peer: SocketAddr },
}

impl BusEvent for NetworkEvent {
    fn topic(&self) -> &'static str {
        match self {
            Self::InventoryReceived { .. } => "network.inventory_received",
            Self::PeerConnected { .. } => "network.peer_connected",
            Self::PeerDisconnected { .. } => "network.peer_disconnected",
        }
    }
}
