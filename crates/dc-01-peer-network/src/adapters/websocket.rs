//! WebSocket transport: the same frames, one per binary WebSocket message.

use crate::domain::{Message, NetworkError, NetworkResult};
use crate::ports::{Connection, FrameReader, FrameWriter};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::trace;

pub struct WsReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
    magic: u32,
}

#[async_trait]
impl<S> FrameReader for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_message(&mut self) -> NetworkResult<Message> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Binary(data))) => return Message::decode(&data, self.magic),
                Some(Ok(WsMessage::Close(_))) | None => return Err(NetworkError::ConnectionClosed),
                Some(Ok(other)) => trace!(len = other.len(), "Skipping non-binary frame"),
                Some(Err(error)) => return Err(ws_error(error)),
            }
        }
    }
}

pub struct WsWriter<S> {
    sink: SplitSink<WebSocketStream<S>, WsMessage>,
    magic: u32,
}

#[async_trait]
impl<S> FrameWriter for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_message(&mut self, message: &Message) -> NetworkResult<()> {
        let bytes = message.encode(self.magic)?;
        self.sink
            .send(WsMessage::binary(bytes))
            .await
            .map_err(ws_error)
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

fn ws_error(error: WsError) -> NetworkError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => NetworkError::ConnectionClosed,
        WsError::Io(error) => NetworkError::Io(error),
        other => NetworkError::WebSocket(other.to_string()),
    }
}

/// Wrap an upgraded WebSocket as a connection.
pub fn ws_connection<S>(remote: SocketAddr, socket: WebSocketStream<S>, magic: u32) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = socket.split();
    Connection {
        remote,
        reader: Box::new(WsReader { stream, magic }),
        writer: Box::new(WsWriter { sink, magic }),
    }
}

/// Complete the server side of the upgrade on an accepted socket.
pub async fn accept(stream: TcpStream, magic: u32) -> NetworkResult<Connection> {
    let remote = stream.peer_addr()?;
    let socket = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(ws_error)?;
    Ok(ws_connection(remote, socket, magic))
}
