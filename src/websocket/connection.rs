//! WebSocket connection manager
//!
//! Manages active WebSocket connections using DashMap for concurrent access.
//! Supports multiple connections per user (e.g., mobile + web).

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use super::messages::PushEvent;
use crate::models::UserId;

/// Outbound frames are serialized once and shared by every recipient
pub type WsSender = mpsc::UnboundedSender<String>;

/// Unique connection identifier
pub type ConnectionId = u64;

/// WebSocket connection manager
///
/// Thread-safe connection registry that maps user_id to their active
/// WebSocket connections.
pub struct ConnectionManager {
    /// user_id -> list of (connection_id, sender)
    connections: DashMap<UserId, Vec<(ConnectionId, WsSender)>>,
    /// Next connection ID
    next_conn_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Register a session; returns its connection ID
    pub fn add_connection(&self, user_id: UserId, tx: WsSender) -> ConnectionId {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);

        let total = {
            let mut senders = self.connections.entry(user_id).or_insert_with(Vec::new);
            senders.push((conn_id, tx));
            senders.len()
        };

        tracing::info!(
            user_id,
            conn_id,
            total_connections = total,
            "WebSocket connection added"
        );

        conn_id
    }

    /// Called when a connection is closed. Cleans up empty user entries.
    pub fn remove_connection(&self, user_id: UserId, conn_id: ConnectionId) {
        if let Some(mut senders) = self.connections.get_mut(&user_id) {
            senders.retain(|(id, _)| *id != conn_id);

            if senders.is_empty() {
                drop(senders); // Release the shard lock before remove
                self.connections.remove_if(&user_id, |_, v| v.is_empty());
                tracing::info!(user_id, conn_id, "All WebSocket connections closed");
            } else {
                tracing::info!(
                    user_id,
                    conn_id,
                    remaining_connections = senders.len(),
                    "WebSocket connection removed"
                );
            }
        }
    }

    /// Fan an event out to every connected session.
    ///
    /// Fire and forget: closed sessions are skipped, nothing is queued or replayed.
    /// Returns the number of sessions the frame was handed to.
    pub fn publish(&self, event: &PushEvent) -> usize {
        let Some(json) = encode(event) else {
            return 0;
        };

        let mut delivered = 0;
        for entry in self.connections.iter() {
            for (_, tx) in entry.value() {
                if tx.send(json.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }

        tracing::debug!(event = event.kind(), recipients = delivered, "Event published");
        delivered
    }

    /// Returns (number of users, total connections)
    pub fn stats(&self) -> (usize, usize) {
        let users = self.connections.len();
        let total_connections: usize = self
            .connections
            .iter()
            .map(|entry| entry.value().len())
            .sum();
        (users, total_connections)
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn encode<T: Serialize>(message: &T) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode WebSocket frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_manager_add_remove() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn_id = manager.add_connection(1001, tx);
        assert_eq!(manager.stats(), (1, 1));

        manager.remove_connection(1001, conn_id);
        assert_eq!(manager.stats(), (0, 0));
    }

    #[test]
    fn test_multiple_connections_per_user() {
        let manager = ConnectionManager::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let conn_id1 = manager.add_connection(1001, tx1);
        let conn_id2 = manager.add_connection(1001, tx2);
        assert_eq!(manager.stats(), (1, 2));

        manager.remove_connection(1001, conn_id1);
        assert_eq!(manager.stats(), (1, 1));

        manager.remove_connection(1001, conn_id2);
        assert_eq!(manager.stats(), (0, 0));
    }

    #[test]
    fn test_publish_reaches_every_session() {
        let manager = ConnectionManager::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, rx3) = mpsc::unbounded_channel();
        manager.add_connection(1, tx1);
        manager.add_connection(2, tx2);
        manager.add_connection(3, tx3);
        drop(rx3); // closed session is skipped, not an error

        let delivered = manager.publish(&PushEvent::BalanceUpdate { user_id: 1 });
        assert_eq!(delivered, 2);

        let frame = rx1.try_recv().unwrap();
        assert!(frame.contains("BALANCE_UPDATE"));
        assert_eq!(rx2.try_recv().unwrap(), frame);
    }
}
