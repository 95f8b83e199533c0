//! # dc-01-peer-network
//!
//! The peer-to-peer side of a node: framing, handshakes, gossip relay,
//! header-first block sync and bloom-filtered light peers.
//!
//! ## Architecture
//!
//! - **Domain** (`domain/`): the 24-byte framed [`Message`], command
//!   payloads, known-hash suppression and the global mission set that keeps
//!   two peers from being asked for the same object
//! - **Ports** (`ports/`): [`FrameReader`] / [`FrameWriter`], a connection
//!   split into its two halves
//! - **Adapters** (`adapters/`): TCP streams and WebSocket binary frames
//! - **Service** (`service/`): [`LocalNode`] owns the peer table and the
//!   relay gate; [`RemoteNode`] is one peer's queues, filter and session
//!
//! ## Wire frame
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | magic, little-endian |
//! | 4 | 12 | command, ASCII, zero padded |
//! | 16 | 4 | payload length |
//! | 20 | 4 | first 4 bytes of the payload's double SHA-256 |
//! | 24 | n | payload |

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::NetworkConfig;
pub use domain::{
    Command, InventoryItem, Message, MessageHeader, NetworkError, NetworkResult, VersionPayload,
};
pub use ports::{Connection, FrameReader, FrameWriter};
pub use service::{LocalNode, NetworkEvent, RemoteNode};
