//! # Shared Bus - In-Process Event Bus
//!
//! Components never call back into each other through event handlers.
//! Producers publish typed events; consumers hold a [`Subscription`] and
//! drain it from their own task, outside any lock the producer holds.
//!
//! ```text
//! ┌──────────────┐   publish()   ┌──────────────┐   recv()   ┌──────────────┐
//! │   Ledger     │ ────────────▶ │  Event Bus   │ ─────────▶ │  Consensus   │
//! │ (persist)    │               │ (broadcast)  │ ─────────▶ │  Local node  │
//! └──────────────┘               └──────────────┘            └──────────────┘
//! ```
//!
//! A subscriber that falls more than the channel capacity behind skips the
//! oldest events and logs the gap.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod publisher;
pub mod subscriber;

pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// An event that can travel on the bus.
pub trait BusEvent: Clone + Send + std::fmt::Debug + 'static {
    /// Short name used in logs.
    fn topic(&self) -> &'static str;
}
