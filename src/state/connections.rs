//! Process-wide mapping `userId -> set of connections on this instance`.
//!
//! Mirrors the teacher's in-memory connection registries (`UserManager`),
//! generalized from single-connection-per-nick IRC sessions to
//! multi-device fan-out: one user id can own several live connections at
//! once, each identified by a locally-unique connection id.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::state::ServerEvent;

pub type ConnectionId = u64;

/// A single local connection's outbound handle: the WebSocket write loop
/// holds the paired receiver and forwards everything sent here to the
/// socket.
type Outbox = mpsc::UnboundedSender<ServerEvent>;

const OUTBOX_CAPACITY_HINT: usize = 256;

#[derive(Default)]
pub struct ConnectionManager {
    by_user: DashMap<String, DashMap<ConnectionId, Outbox>>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self { by_user: DashMap::new(), next_id: AtomicU64::new(1) }
    }

    /// Register a new local connection for `user_id`. Returns the
    /// connection id (used to unregister later) and the receiver the
    /// caller's write loop should drain.
    pub fn register(&self, user_id: &str) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.by_user.entry(user_id.to_string()).or_default().insert(id, tx);
        (id, rx)
    }

    pub fn unregister(&self, user_id: &str, id: ConnectionId) {
        if let Some(conns) = self.by_user.get(user_id) {
            conns.remove(&id);
            if conns.is_empty() {
                drop(conns);
                self.by_user.remove(user_id);
            }
        }
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.by_user.get(user_id).map(|c| c.len()).unwrap_or(0)
    }

    /// Send to every local connection for a user. A closed channel (the
    /// write loop already exited) is silently dropped; the next
    /// `unregister` call cleans it up.
    pub fn send_to_user(&self, user_id: &str, event: ServerEvent) {
        let Some(conns) = self.by_user.get(user_id) else { return };
        for entry in conns.iter() {
            let _ = entry.value().send(event.clone());
        }
    }

    /// Send to a single connection, used for `message:sent` and other
    /// sender-only confirmations that shouldn't fan out to the sender's
    /// other devices.
    pub fn send_to_connection(&self, user_id: &str, id: ConnectionId, event: ServerEvent) {
        if let Some(conns) = self.by_user.get(user_id)
            && let Some(tx) = conns.get(&id)
        {
            let _ = tx.send(event);
        }
    }

    /// Close every local connection for `user_id` by handing each its
    /// `force:disconnect` event; the write loop is expected to close the
    /// socket immediately after forwarding it.
    pub fn force_disconnect_local(&self, user_id: &str, reason: &'static str) {
        self.send_to_user(user_id, ServerEvent::ForceDisconnect { reason: reason.to_string() });
    }

    pub fn is_online_locally(&self, user_id: &str) -> bool {
        self.connection_count(user_id) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister_tracks_count() {
        let manager = ConnectionManager::new();
        let (id, _rx) = manager.register("u1");
        assert_eq!(manager.connection_count("u1"), 1);
        manager.unregister("u1", id);
        assert_eq!(manager.connection_count("u1"), 0);
    }

    #[test]
    fn multi_device_fanout_reaches_all_connections() {
        let manager = ConnectionManager::new();
        let (_id_a, mut rx_a) = manager.register("u1");
        let (_id_b, mut rx_b) = manager.register("u1");

        manager.send_to_user("u1", ServerEvent::ForceDisconnect { reason: "test".to_string() });

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }
}
