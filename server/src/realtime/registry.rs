//! Process-wide registry of live chat connections.
//!
//! One entry per user id. Registering while an entry exists replaces it
//! (last writer wins): the marketplace has no multi-device fan-out, a second
//! login simply takes over delivery. The replaced connection is not closed
//! here; dropping its send queue ends its forwarding task on next poll.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::models::{ChatEvent, UserId};

/// Token identifying one registration. Cleanup paths present it back so a
/// replaced connection cannot evict its successor.
pub type ConnectionToken = u64;

struct ConnectionEntry {
    token: ConnectionToken,
    tx: mpsc::Sender<ChatEvent>,
}

pub struct ConnectionRegistry {
    connections: DashMap<UserId, ConnectionEntry>,
    next_token: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_token: AtomicU64::new(1),
        }
    }

    /// Store the send side of a user's connection, replacing any prior
    /// entry. Returns the token the owning session must use to clean up.
    pub fn register(&self, user_id: UserId, tx: mpsc::Sender<ChatEvent>) -> ConnectionToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .connections
            .insert(user_id, ConnectionEntry { token, tx })
            .is_some();
        if replaced {
            debug!(user_id, "Replaced existing chat connection");
        }
        token
    }

    /// Remove the entry for `user_id`. No-op if absent.
    pub fn unregister(&self, user_id: UserId) {
        self.connections.remove(&user_id);
    }

    /// Remove the entry for `user_id` only if it still belongs to the
    /// session holding `token`. No-op if absent or already replaced.
    pub fn unregister_if_current(&self, user_id: UserId, token: ConnectionToken) {
        self.connections
            .remove_if(&user_id, |_, entry| entry.token == token);
    }

    /// Send handle for a user's live connection, if any. Pure read.
    pub fn lookup(&self, user_id: UserId) -> Option<mpsc::Sender<ChatEvent>> {
        self.connections.get(&user_id).map(|entry| entry.tx.clone())
    }

    /// Number of currently registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<ChatEvent>, mpsc::Receiver<ChatEvent>) {
        mpsc::channel(8)
    }

    #[test]
    fn test_register_lookup_unregister() {
        let registry = ConnectionRegistry::new();
        assert!(registry.lookup(1).is_none());

        let (tx, _rx) = channel();
        registry.register(1, tx);
        assert!(registry.lookup(1).is_some());
        assert_eq!(registry.connection_count(), 1);

        registry.unregister(1);
        assert!(registry.lookup(1).is_none());
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.unregister(99);
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();

        registry.register(1, tx1);
        registry.register(1, tx2);
        assert_eq!(registry.connection_count(), 1);

        let event = ChatEvent {
            text: "hi".to_string(),
            to_user_id: 1,
            from_user_id: 2,
        };
        registry
            .lookup(1)
            .expect("connection registered")
            .try_send(event.clone())
            .expect("send to live connection");

        assert_eq!(rx2.recv().await, Some(event));
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_stale_cleanup_does_not_evict_successor() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        let old_token = registry.register(1, tx1);
        registry.register(1, tx2);

        // The replaced session's cleanup runs late; the new entry survives.
        registry.unregister_if_current(1, old_token);
        assert!(registry.lookup(1).is_some());
    }
}
