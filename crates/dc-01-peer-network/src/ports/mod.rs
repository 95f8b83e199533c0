//! Ports: the byte transports a peer session runs over.

pub mod transport;

pub use transport::{Connection, FrameReader, FrameWriter};
