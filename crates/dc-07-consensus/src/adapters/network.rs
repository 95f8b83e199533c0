use crate::ports::ConsensusRelay;
use dc_01_peer_network::{InventoryItem, LocalNode};
use shared_types::UInt256;

impl ConsensusRelay for LocalNode {
    fn relay(&self, item: InventoryItem) -> bool {
        LocalNode::relay(self, item)
    }

    fn request_transactions(&self, hashes: &[UInt256]) {
        LocalNode::request_transactions(self, hashes)
    }

    fn synchronize_memory_pool(&self) {
        LocalNode::synchronize_memory_pool(self)
    }
}
