use dc_02_ledger::LedgerError;
use dc_06_bloom_filters::FilterError;
use shared_types::FormatError;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Magic mismatch: expected {expected:#010x}, got {actual:#010x}")]
    MagicMismatch { expected: u32, actual: u32 },

    #[error("Payload checksum mismatch")]
    ChecksumMismatch,

    #[error("Payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    /// The frame was well formed but names a command this node ignores.
    #[error("Unknown command {0:?}")]
    UnknownCommand(String),

    #[error("Malformed payload: {0}")]
    Format(#[from] FormatError),

    #[error("Bad bloom filter: {0}")]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Handshake with {peer} failed: {reason}")]
    Handshake { peer: SocketAddr, reason: &'static str },

    #[error("Protocol violation: {0}")]
    Protocol(&'static str),

    #[error("Peer {0} timed out")]
    Timeout(SocketAddr),

    /// Requested inventory was not delivered in time.
    #[error("Peer {0} stalled on requested inventory")]
    Stalled(SocketAddr),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

impl NetworkError {
    /// Errors after which the stream can no longer be trusted to be aligned
    /// on a frame boundary, or the peer broke the protocol.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnknownCommand(_))
    }
}

pub type NetworkResult<T> = Result<T, NetworkError>;
