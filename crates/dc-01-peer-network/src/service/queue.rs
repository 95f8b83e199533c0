//! Per-peer outbound queues.
//!
//! Control messages go out before bulk traffic. Requests that only make
//! sense once (`getblocks`, `getaddr`, ...) are dropped while an identical
//! command is still waiting in the same queue.

use crate::domain::Message;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Queues {
    high: VecDeque<Message>,
    low: VecDeque<Message>,
}

#[derive(Debug, Default)]
pub struct OutboundQueue {
    queues: Mutex<Queues>,
    ready: Notify,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `message`. Returns false if it collapsed into a pending copy.
    pub fn push(&self, message: Message) -> bool {
        let command = message.command;
        {
            let mut queues = self.queues.lock();
            let queue = if command.is_high_priority() {
                &mut queues.high
            } else {
                &mut queues.low
            };
            if command.is_single() && queue.iter().any(|queued| queued.command == command) {
                return false;
            }
            queue.push_back(message);
        }
        self.ready.notify_one();
        true
    }

    pub fn pop(&self) -> Option<Message> {
        let mut queues = self.queues.lock();
        queues.high.pop_front().or_else(|| queues.low.pop_front())
    }

    /// Wait for the next message.
    pub async fn next(&self) -> Message {
        loop {
            if let Some(message) = self.pop() {
                return message;
            }
            self.ready.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        let queues = self.queues.lock();
        queues.high.len() + queues.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Command;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_high_priority_first() {
        let queue = OutboundQueue::new();
        queue.push(Message::empty(Command::Inv));
        queue.push(Message::empty(Command::Tx));
        queue.push(Message::empty(Command::Consensus));
        let order: Vec<Command> = std::iter::from_fn(|| queue.pop())
            .map(|m| m.command)
            .collect();
        assert_eq!(order, vec![Command::Consensus, Command::Inv, Command::Tx]);
    }

    #[test]
    fn test_single_commands_collapse() {
        let queue = OutboundQueue::new();
        assert!(queue.push(Message::empty(Command::GetBlocks)));
        assert!(!queue.push(Message::empty(Command::GetBlocks)));
        assert!(queue.push(Message::empty(Command::GetData)));
        assert!(queue.push(Message::empty(Command::GetData)));
        assert!(queue.push(Message::empty(Command::GetAddr)));
        assert!(!queue.push(Message::empty(Command::GetAddr)));
        assert_eq!(queue.len(), 4);

        while queue.pop().is_some() {}
        assert!(queue.push(Message::empty(Command::GetBlocks)));
    }

    #[tokio::test]
    async fn test_next_wakes_on_push() {
        let queue = Arc::new(OutboundQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(Message::empty(Command::Verack));
        let message = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.command, Command::Verack);
    }
}
