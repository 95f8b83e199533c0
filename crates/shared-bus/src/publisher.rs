//! # Event Publisher

use crate::subscriber::{EventFilter, Subscription};
use crate::{BusEvent, DEFAULT_CHANNEL_CAPACITY};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Publishing side of the bus.
pub trait EventPublisher<E: BusEvent>: Send + Sync {
    /// Publish an event. Returns the number of subscribers that will see it.
    fn publish(&self, event: E) -> usize;

    /// Total number of events published.
    fn events_published(&self) -> u64;
}

/// Broadcast-channel event bus for a single node.
pub struct InMemoryEventBus<E: BusEvent> {
    sender: broadcast::Sender<E>,
    events_published: AtomicU64,
    capacity: usize,
}

impl<E: BusEvent> InMemoryEventBus<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Receive every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<E> {
        Subscription::new(self.sender.subscribe(), None)
    }

    /// Receive only events matching `filter`.
    #[must_use]
    pub fn subscribe_filtered<F>(&self, filter: F) -> Subscription<E>
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let filter: EventFilter<E> = Arc::new(filter);
        Subscription::new(self.sender.subscribe(), Some(filter))
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<E: BusEvent> Default for InMemoryEventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> EventPublisher<E> for InMemoryEventBus<E> {
    fn publish(&self, event: E) -> usize {
        let topic = event.topic();
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receivers) => {
                trace!(topic, receivers, "Event published");
                receivers
            }
            Err(_) => {
                debug!(topic, "Event dropped (no receivers)");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
