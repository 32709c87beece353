//! Process-local pub/sub for post-commit change notifications.
//!
//! Each stream subscriber owns a bounded queue. Publishing never blocks:
//! a subscriber whose queue is full (or whose receiver is gone) is
//! dropped on the spot and will re-sync through the pull cursor after it
//! reconnects.

use crate::types::ChangeEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fan-out hub for `entity_changed` events.
pub struct EventBroadcaster {
    subscribers: DashMap<Uuid, mpsc::Sender<ChangeEvent>>,
    queue_capacity: usize,
}

impl EventBroadcaster {
    /// Create a broadcaster whose subscriber queues hold at most
    /// `queue_capacity` undelivered events.
    pub fn new(queue_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: DashMap::new(),
            queue_capacity,
        })
    }

    /// Register a new subscriber and hand back its queue.
    pub fn connect(&self) -> (Uuid, mpsc::Receiver<ChangeEvent>) {
        let client_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.subscribers.insert(client_id, tx);
        debug!(%client_id, "stream subscriber connected");
        (client_id, rx)
    }

    /// Unregister a subscriber and release its queue.
    pub fn disconnect(&self, client_id: Uuid) {
        if self.subscribers.remove(&client_id).is_some() {
            debug!(%client_id, "stream subscriber disconnected");
        }
    }

    /// Enqueue an event for every subscriber except `exclude`.
    pub fn broadcast(&self, event: &ChangeEvent, exclude: Option<Uuid>) {
        let mut dead = Vec::new();

        for entry in self.subscribers.iter() {
            let client_id = *entry.key();
            if Some(client_id) == exclude {
                continue;
            }
            match entry.value().try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(%client_id, "subscriber queue full, dropping subscriber");
                    dead.push(client_id);
                }
                Err(TrySendError::Closed(_)) => {
                    dead.push(client_id);
                }
            }
        }

        // Removal happens outside the iteration to keep the map guards
        // short-lived.
        for client_id in dead {
            self.subscribers.remove(&client_id);
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    fn event(sync_id: i64) -> ChangeEvent {
        ChangeEvent::entity_changed(EntityType::PreOrder, Uuid::new_v4(), sync_id)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let broadcaster = EventBroadcaster::new(16);
        let (_id_a, mut rx_a) = broadcaster.connect();
        let (_id_b, mut rx_b) = broadcaster.connect();

        broadcaster.broadcast(&event(1), None);

        assert_eq!(rx_a.recv().await.unwrap().sync_id, 1);
        assert_eq!(rx_b.recv().await.unwrap().sync_id, 1);
    }

    #[tokio::test]
    async fn test_exclude_suppresses_echo() {
        let broadcaster = EventBroadcaster::new(16);
        let (id_a, mut rx_a) = broadcaster.connect();
        let (_id_b, mut rx_b) = broadcaster.connect();

        broadcaster.broadcast(&event(1), Some(id_a));

        assert_eq!(rx_b.recv().await.unwrap().sync_id, 1);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_releases_queue() {
        let broadcaster = EventBroadcaster::new(16);
        let (id, mut rx) = broadcaster.connect();
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.disconnect(id);
        assert_eq!(broadcaster.subscriber_count(), 0);

        broadcaster.broadcast(&event(1), None);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_dropped_not_blocked() {
        let broadcaster = EventBroadcaster::new(1);
        let (_id, mut rx) = broadcaster.connect();

        broadcaster.broadcast(&event(1), None);
        // Queue is full now; this publish drops the subscriber instead
        // of waiting.
        broadcaster.broadcast(&event(2), None);

        assert_eq!(broadcaster.subscriber_count(), 0);
        // The first event is still in the queue, then the channel ends.
        assert_eq!(rx.recv().await.unwrap().sync_id, 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_receiver_is_pruned_on_broadcast() {
        let broadcaster = EventBroadcaster::new(4);
        let (_id, rx) = broadcaster.connect();
        drop(rx);

        broadcaster.broadcast(&event(1), None);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let broadcaster = EventBroadcaster::new(16);
        let (_id, mut rx) = broadcaster.connect();

        for sync_id in 1..=5 {
            broadcaster.broadcast(&event(sync_id), None);
        }
        for expected in 1..=5 {
            assert_eq!(rx.recv().await.unwrap().sync_id, expected);
        }
    }
}
