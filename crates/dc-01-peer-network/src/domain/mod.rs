//! Network domain: framing, payloads and the bookkeeping behind relay.

pub mod errors;
pub mod inventory;
pub mod known_hashes;
pub mod message;
pub mod missions;
pub mod payloads;

pub use errors::{NetworkError, NetworkResult};
pub use inventory::{InventoryItem, RelayCache, RELAY_CACHE_CAPACITY};
pub use known_hashes::KnownHashes;
pub use message::{Command, Message, MessageHeader, COMMAND_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use missions::{Missions, PeerMissions};
pub use payloads::{
    unix_time, AddrPayload, FilterAddPayload, FilterLoadPayload, GetBlocksPayload,
    HeadersPayload, InvPayload, MerkleBlockPayload, NetworkAddressWithTime, VersionPayload,
    MAX_ADDRESSES, MAX_HASHES, MAX_HEADERS, MAX_START_HASHES, NODE_NETWORK,
};
