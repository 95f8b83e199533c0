//! Byte-stream transport: TCP sockets, or any async read/write pair.

use crate::domain::{Message, MessageHeader, NetworkError, NetworkResult, HEADER_SIZE};
use crate::ports::{Connection, FrameReader, FrameWriter};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

pub struct StreamReader<R> {
    inner: R,
    magic: u32,
}

impl<R> StreamReader<R> {
    pub fn new(inner: R, magic: u32) -> Self {
        Self { inner, magic }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FrameReader for StreamReader<R> {
    async fn read_message(&mut self) -> NetworkResult<Message> {
        let mut head = [0u8; HEADER_SIZE];
        self.inner.read_exact(&mut head).await.map_err(closed)?;
        let header = MessageHeader::decode(&head, self.magic)?;
        let mut payload = vec![0u8; header.length];
        self.inner.read_exact(&mut payload).await.map_err(closed)?;
        Message::from_parts(header, payload)
    }
}

pub struct StreamWriter<W> {
    inner: W,
    magic: u32,
}

impl<W> StreamWriter<W> {
    pub fn new(inner: W, magic: u32) -> Self {
        Self { inner, magic }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameWriter for StreamWriter<W> {
    async fn write_message(&mut self, message: &Message) -> NetworkResult<()> {
        let bytes = message.encode(self.magic)?;
        self.inner.write_all(&bytes).await.map_err(closed)?;
        self.inner.flush().await.map_err(closed)?;
        Ok(())
    }

    async fn close(&mut self) {
        // the peer may already be gone
        let _ = self.inner.shutdown().await;
    }
}

fn closed(error: std::io::Error) -> NetworkError {
    match error.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
            NetworkError::ConnectionClosed
        }
        _ => NetworkError::Io(error),
    }
}

/// Wrap any read/write pair as a connection.
pub fn stream_connection<R, W>(remote: SocketAddr, reader: R, writer: W, magic: u32) -> Connection
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    Connection {
        remote,
        reader: Box::new(StreamReader::new(reader, magic)),
        writer: Box::new(StreamWriter::new(writer, magic)),
    }
}

pub fn tcp_connection(stream: TcpStream, magic: u32) -> NetworkResult<Connection> {
    stream.set_nodelay(true)?;
    let remote = stream.peer_addr()?;
    let (reader, writer) = stream.into_split();
    Ok(stream_connection(remote, reader, writer, magic))
}

/// Dial `endpoint`, giving up after `timeout`.
pub async fn connect(endpoint: SocketAddr, magic: u32, timeout: Duration) -> NetworkResult<Connection> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(endpoint))
        .await
        .map_err(|_| NetworkError::Timeout(endpoint))??;
    tcp_connection(stream, magic)
}
