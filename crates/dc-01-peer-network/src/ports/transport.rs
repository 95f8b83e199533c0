//! Transport seam between sockets and the peer protocol.
//!
//! A session only ever reads whole messages and writes whole messages, so
//! TCP streams, WebSocket frames and in-memory pipes look the same to it.

use crate::domain::{Message, NetworkResult};
use async_trait::async_trait;
use std::net::SocketAddr;

#[async_trait]
pub trait FrameReader: Send {
    /// Next complete message. A frame naming an unknown command yields
    /// `NetworkError::UnknownCommand` and leaves the reader aligned.
    async fn read_message(&mut self) -> NetworkResult<Message>;
}

#[async_trait]
pub trait FrameWriter: Send {
    async fn write_message(&mut self, message: &Message) -> NetworkResult<()>;

    async fn close(&mut self);
}

/// Both halves of an established connection.
pub struct Connection {
    pub remote: SocketAddr,
    pub reader: Box<dyn FrameReader>,
    pub writer: Box<dyn FrameWriter>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}
