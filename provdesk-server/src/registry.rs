//! Dashboard connection registry
//!
//! The one shared, concurrently-mutated structure in the server: request
//! handlers broadcast while WebSocket tasks register and unregister. A
//! mutex serializes add/remove/iterate; each subscriber gets an unbounded
//! channel, so a broadcast never blocks the originating handler and every
//! connection observes events in the order its handlers produced them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use provdesk_core::event::DashboardEvent;
use tokio::sync::mpsc;

/// Identifier for one registered dashboard connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionId(pub u64);

struct Subscriber {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<String>,
}

/// Registry of live dashboard connections
pub struct EventHub {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Track a new connection. The caller pumps the returned receiver into
    /// its socket; per-connection ordering is the channel's FIFO order.
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(Subscriber { id, tx });
        (id, rx)
    }

    /// Remove a connection. Tolerant of repeated or late calls.
    pub fn unregister(&self, id: ConnectionId) {
        self.subscribers.lock().unwrap().retain(|s| s.id != id);
    }

    /// Push an event to every currently tracked connection, best-effort.
    ///
    /// A send failure means the receiving task is already gone; it is
    /// skipped, never propagated, and the connection is removed when its
    /// own socket task unregisters.
    pub fn broadcast(&self, event: &DashboardEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize dashboard event");
                return;
            }
        };

        let subscribers = self.subscribers.lock().unwrap();
        for subscriber in subscribers.iter() {
            if subscriber.tx.send(payload.clone()).is_err() {
                tracing::debug!(
                    connection = subscriber.id.0,
                    "Skipping closed dashboard connection"
                );
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use provdesk_core::model::{RequestId, RequestStatus};

    use super::*;

    fn event(id: i64) -> DashboardEvent {
        DashboardEvent::status_update(RequestId(id), RequestStatus::Completed)
    }

    #[test]
    fn test_broadcast_reaches_every_connection() {
        let hub = EventHub::new();
        let (_a, mut rx_a) = hub.register();
        let (_b, mut rx_b) = hub.register();

        hub.broadcast(&event(1));
        hub.broadcast(&event(2));

        for rx in [&mut rx_a, &mut rx_b] {
            let first = rx.try_recv().unwrap();
            let second = rx.try_recv().unwrap();
            assert!(first.contains("\"id\":1"));
            assert!(second.contains("\"id\":2"));
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_unregistered_connection_receives_nothing_further() {
        let hub = EventHub::new();
        let (id_a, mut rx_a) = hub.register();
        let (_b, mut rx_b) = hub.register();

        hub.broadcast(&event(1));
        hub.unregister(id_a);
        hub.broadcast(&event(2));

        assert!(rx_a.try_recv().unwrap().contains("\"id\":1"));
        assert!(rx_a.try_recv().is_err());

        assert!(rx_b.try_recv().unwrap().contains("\"id\":1"));
        assert!(rx_b.try_recv().unwrap().contains("\"id\":2"));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let hub = EventHub::new();
        let (id, _rx) = hub.register();
        hub.unregister(id);
        hub.unregister(id);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_dead_receiver_does_not_block_others() {
        let hub = EventHub::new();
        let (_a, rx_a) = hub.register();
        let (_b, mut rx_b) = hub.register();

        drop(rx_a);
        hub.broadcast(&event(1));

        assert!(rx_b.try_recv().unwrap().contains("\"id\":1"));
    }

    #[test]
    fn test_no_backlog_for_late_joiners() {
        let hub = EventHub::new();
        hub.broadcast(&event(1));

        let (_id, mut rx) = hub.register();
        assert!(rx.try_recv().is_err());
    }
}
