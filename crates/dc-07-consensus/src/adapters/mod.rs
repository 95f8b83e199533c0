//! Adapters binding the ports to the peer network.

pub mod network;
