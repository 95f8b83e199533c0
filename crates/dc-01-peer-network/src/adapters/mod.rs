//! Transport adapters.
//!
//! - `tcp`: plain byte streams, framed by the 24-byte header
//! - `websocket`: one frame per binary WebSocket message

pub mod tcp;
pub mod websocket;

pub use tcp::{connect, stream_connection, tcp_connection, StreamReader, StreamWriter};
pub use websocket::{ws_connection, WsReader, WsWriter};
