//! Peer network configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// TCP listen port; 0 disables inbound TCP.
    pub port: u16,
    /// WebSocket listen port; 0 disables it.
    pub ws_port: u16,
    /// Connected peers the node tries to keep.
    pub connected_max: usize,
    /// Connected peers above which the newest extras are dropped.
    pub desired_available: usize,
    pub unconnected_max: usize,
    /// `host:port` entries dialled when nothing else is known.
    pub seed_list: Vec<String>,
    /// Bound on dialling plus each handshake step.
    pub handshake_timeout: Duration,
    /// Receive timeout while nothing was requested from the peer.
    pub idle_timeout: Duration,
    /// Receive timeout while requests are outstanding; also the stall limit.
    pub mission_timeout: Duration,
    /// Pause between connection top-up rounds.
    pub connect_interval: Duration,
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: 10333,
            ws_port: 10334,
            connected_max: 10,
            desired_available: 15,
            unconnected_max: 1000,
            seed_list: Vec::new(),
            handshake_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(30 * 60),
            mission_timeout: Duration::from_secs(60),
            connect_interval: Duration::from_secs(5),
            user_agent: format!("/dBFT-Chain:{}/", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl NetworkConfig {
    /// No listeners, fast timers.
    pub fn for_testing() -> Self {
        Self {
            port: 0,
            ws_port: 0,
            handshake_timeout: Duration::from_secs(2),
            connect_interval: Duration::from_millis(50),
            ..Self::default()
        }
    }
}
