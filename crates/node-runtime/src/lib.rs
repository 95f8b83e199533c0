//! # Node Runtime Library
//!
//! Configuration, wiring and task management for a dBFT-Chain node. The
//! binary in `main.rs` is a thin shell around [`NodeRuntime`].
//!
//! ## Structure
//!
//! - `container/` - [`NodeConfig`] loading and [`NodeContainer`], which
//!   builds the subsystems in dependency order
//! - `runtime` - [`NodeRuntime`], which spawns their tasks and stops them

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod container;
pub mod runtime;

pub use container::{ConfigError, NodeConfig, NodeContainer};
pub use runtime::NodeRuntime;
