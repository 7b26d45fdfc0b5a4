//! Bounded outbound queue used while the connection is down.
//!
//! Capacity overflow evicts according to [`EvictionPolicy`]; entries older
//! than the configured maximum age are purged lazily on every access. Both
//! kinds of eviction are counted, never reported as errors.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::envelope::Envelope;

/// Which entry gives way when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Evict the oldest entry; the new one is always kept.
    #[default]
    DropOldest,
    /// Refuse the new entry; queued entries are kept.
    DropNewest,
}

/// A message waiting for a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    /// The envelope to transmit
    pub envelope: Envelope,
    /// When it entered the queue
    pub enqueued_at: Instant,
    /// Transmissions tried so far
    pub attempts: u32,
}

impl QueuedMessage {
    /// Wrap an envelope that has not been transmitted yet.
    pub fn new(envelope: Envelope) -> Self {
        Self {
            envelope,
            enqueued_at: Instant::now(),
            attempts: 0,
        }
    }

    /// The envelope id
    pub fn id(&self) -> &str {
        &self.envelope.id
    }

    /// The envelope type
    pub fn kind(&self) -> &str {
        &self.envelope.kind
    }
}

/// Bounded FIFO of outbound messages.
#[derive(Debug)]
pub struct MessageQueue {
    entries: VecDeque<QueuedMessage>,
    capacity: usize,
    max_age: Option<Duration>,
    policy: EvictionPolicy,
    evicted: u64,
}

impl MessageQueue {
    /// Create a drop-oldest queue with no age limit.
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, EvictionPolicy::DropOldest, None)
    }

    /// Create a queue with an explicit eviction policy and age limit.
    pub fn with_policy(capacity: usize, policy: EvictionPolicy, max_age: Option<Duration>) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            max_age,
            policy,
            evicted: 0,
        }
    }

    /// Add a message. Returns `false` if anything was evicted to make room
    /// (or, under [`EvictionPolicy::DropNewest`], if `message` itself was refused).
    pub fn enqueue(&mut self, message: QueuedMessage) -> bool {
        self.purge_expired();

        if self.capacity == 0 {
            self.evicted += 1;
            return false;
        }

        if self.entries.len() < self.capacity {
            self.entries.push_back(message);
            return true;
        }

        self.evicted += 1;
        match self.policy {
            EvictionPolicy::DropOldest => {
                if let Some(dropped) = self.entries.pop_front() {
                    tracing::debug!(id = %dropped.id(), "Queue full, evicted oldest message");
                }
                self.entries.push_back(message);
            }
            EvictionPolicy::DropNewest => {
                tracing::debug!(id = %message.id(), "Queue full, refused newest message");
            }
        }
        false
    }

    /// Drain every live entry, oldest first.
    pub fn dequeue_all(&mut self) -> Vec<QueuedMessage> {
        self.purge_expired();
        self.entries.drain(..).collect()
    }

    /// Put messages back at the head of the queue, keeping their order.
    ///
    /// Used when a flush is interrupted. If that overflows the capacity,
    /// entries are evicted according to the policy.
    pub fn requeue_front(&mut self, messages: Vec<QueuedMessage>) {
        for message in messages.into_iter().rev() {
            self.entries.push_front(message);
        }
        while self.entries.len() > self.capacity {
            self.evicted += 1;
            match self.policy {
                EvictionPolicy::DropOldest => self.entries.pop_front(),
                EvictionPolicy::DropNewest => self.entries.pop_back(),
            };
        }
    }

    /// Remove entries older than the maximum age. Returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let Some(max_age) = self.max_age else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|m| m.enqueued_at.elapsed() < max_age);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.evicted += removed as u64;
            tracing::debug!(removed, "Purged expired queued messages");
        }
        removed
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages dropped for capacity or age since creation
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Iterate queued messages, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn message(kind: &str) -> QueuedMessage {
        QueuedMessage::new(Envelope::new(kind, json!(null)))
    }

    fn kinds(queue: &MessageQueue) -> Vec<String> {
        queue.iter().map(|m| m.kind().to_string()).collect()
    }

    #[test]
    fn test_drop_oldest_keeps_newest() {
        let mut queue = MessageQueue::new(2);
        assert!(queue.enqueue(message("m1")));
        assert!(queue.enqueue(message("m2")));
        assert!(!queue.enqueue(message("m3")));

        assert_eq!(kinds(&queue), vec!["m2", "m3"]);
        assert_eq!(queue.evicted(), 1);
    }

    #[test]
    fn test_drop_newest_keeps_oldest() {
        let mut queue = MessageQueue::with_policy(2, EvictionPolicy::DropNewest, None);
        queue.enqueue(message("m1"));
        queue.enqueue(message("m2"));
        assert!(!queue.enqueue(message("m3")));

        assert_eq!(kinds(&queue), vec!["m1", "m2"]);
    }

    #[test]
    fn test_dequeue_all_preserves_order_and_drains() {
        let mut queue = MessageQueue::new(10);
        for kind in ["a", "b", "c"] {
            queue.enqueue(message(kind));
        }
        let drained: Vec<_> = queue
            .dequeue_all()
            .into_iter()
            .map(|m| m.envelope.kind)
            .collect();
        assert_eq!(drained, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_requeue_front_restores_order() {
        let mut queue = MessageQueue::new(10);
        queue.enqueue(message("c"));
        queue.requeue_front(vec![message("a"), message("b")]);
        assert_eq!(kinds(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_requeue_front_respects_capacity() {
        let mut queue = MessageQueue::new(2);
        queue.enqueue(message("c"));
        queue.requeue_front(vec![message("a"), message("b")]);
        assert_eq!(kinds(&queue), vec!["b", "c"]);
        assert_eq!(queue.evicted(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_purged() {
        let mut queue =
            MessageQueue::with_policy(10, EvictionPolicy::DropOldest, Some(Duration::from_secs(5)));
        queue.enqueue(message("stale"));
        tokio::time::advance(Duration::from_secs(3)).await;
        queue.enqueue(message("fresh"));
        tokio::time::advance(Duration::from_secs(3)).await;

        let drained = queue.dequeue_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].kind(), "fresh");
        assert_eq!(queue.evicted(), 1);
    }

    #[test]
    fn test_zero_capacity_refuses_everything() {
        let mut queue = MessageQueue::new(0);
        assert!(!queue.enqueue(message("a")));
        assert!(queue.is_empty());
    }
}
