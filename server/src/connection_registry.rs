//! Live connection tracking and the connection to player association
//!
//! This module owns the server-side view of every open transport:
//! - Connection lifecycle (open, close, idle detection)
//! - The connection -> player id association established by `JOIN`
//! - The outbound queue used to push frames to each client
//! - Capacity enforcement
//!
//! Connections are keyed by a [`ConnectionId`] handed out at accept time, so
//! nothing here depends on the identity of the underlying socket.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;

/// Frames that may wait for one connection's writer before new ones are dropped
pub const OUTBOUND_QUEUE_CAPACITY: usize = 128;

/// Opaque handle assigned to a transport when it is accepted
pub type ConnectionId = u64;

/// One open transport and, once it has joined, the player it speaks for
///
/// Each connection keeps:
/// - Connection metadata (ID, remote address, last activity)
/// - The player id registered by its most recent `JOIN`
/// - The sending half of its outbound frame queue
#[derive(Debug)]
pub struct Connection {
    /// Handle assigned at accept time
    pub id: ConnectionId,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// Last time any inbound frame arrived on this connection
    pub last_seen: Instant,
    /// Player registered by this connection, `None` until it joins
    pub player_id: Option<String>,
    sender: mpsc::Sender<Message>,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            player_id: None,
            sender,
        }
    }

    /// Queues a frame for this connection without waiting for delivery
    ///
    /// Returns false when the writer side has already gone away or its queue
    /// is full, in which case the frame is dropped.
    pub fn send(&self, message: Message) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue of connection {} is full, dropping frame", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Registry of all open connections and the players they have joined as
///
/// The registry enforces the connection capacity and guarantees that each
/// connection maps to at most one player id. Removing a connection hands back
/// its last registered player id exactly once, so whichever cleanup path runs
/// first (explicit leave, transport close, idle eviction) is the only one that
/// sees it.
pub struct ConnectionRegistry {
    /// Open connections indexed by their handle
    connections: HashMap<ConnectionId, Connection>,
    /// Maximum number of concurrent connections allowed
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            max_connections,
        }
    }

    /// Tracks a newly accepted connection
    ///
    /// Returns false if the registry is at capacity or the handle is already
    /// in use; the connection is not tracked in either case.
    pub fn add_connection(
        &mut self,
        id: ConnectionId,
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
    ) -> bool {
        if self.is_full() || self.connections.contains_key(&id) {
            return false;
        }

        info!("Connection {} opened from {}", id, addr);
        self.connections
            .insert(id, Connection::new(id, addr, sender));
        true
    }

    /// Stops tracking a connection, returning it if it was still open
    pub fn remove_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        info!("Connection {} from {} closed", id, connection.addr);
        Some(connection)
    }

    /// Associates `player_id` with the connection, returning the id it replaced
    ///
    /// Last write wins. Does nothing for a connection that is not open.
    pub fn register(&mut self, id: ConnectionId, player_id: String) -> Option<String> {
        let connection = self.connections.get_mut(&id)?;
        debug!("Connection {} registered as player {}", id, player_id);
        connection.player_id.replace(player_id)
    }

    /// Player id registered by the connection, if it has joined
    pub fn resolve(&self, id: ConnectionId) -> Option<&str> {
        self.connections
            .get(&id)
            .and_then(|connection| connection.player_id.as_deref())
    }

    /// Drops the player association of a connection, keeping the connection open
    ///
    /// A no-op returning `None` if the connection never joined or is unknown.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<String> {
        self.connections
            .get_mut(&id)
            .and_then(|connection| connection.player_id.take())
    }

    /// Finds the open connection currently registered as `player_id`
    pub fn find_connection_by_player(&self, player_id: &str) -> Option<ConnectionId> {
        self.connections
            .values()
            .find(|connection| connection.player_id.as_deref() == Some(player_id))
            .map(|connection| connection.id)
    }

    /// Records inbound activity for idle detection
    pub fn touch(&mut self, id: ConnectionId) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.touch();
        }
    }

    /// Handles of connections silent for longer than `timeout`
    ///
    /// Connections are not removed; the caller runs them through its own
    /// close path.
    pub fn timed_out(&self, timeout: Duration) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|connection| connection.is_timed_out(timeout))
            .map(|connection| connection.id)
            .collect()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.max_connections
    }

    /// Returns the number of currently open connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if no connections are currently open
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn sender() -> mpsc::Sender<Message> {
        mpsc::channel(OUTBOUND_QUEUE_CAPACITY).0
    }

    #[test]
    fn test_connection_creation() {
        let (tx, _rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let connection = Connection::new(1, test_addr(), tx);

        assert_eq!(connection.id, 1);
        assert_eq!(connection.addr, test_addr());
        assert!(connection.player_id.is_none());
        assert!(connection.is_open());
    }

    #[test]
    fn test_connection_send_after_writer_dropped() {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let connection = Connection::new(1, test_addr(), tx);

        assert!(connection.send(Message::text("hello".to_string())));
        drop(rx);
        assert!(!connection.is_open());
        assert!(!connection.send(Message::text("lost".to_string())));
    }

    #[test]
    fn test_connection_send_drops_frames_when_queue_full() {
        let (tx, mut rx) = mpsc::channel(2);
        let connection = Connection::new(1, test_addr(), tx);

        assert!(connection.send(Message::text("one".to_string())));
        assert!(connection.send(Message::text("two".to_string())));
        assert!(!connection.send(Message::text("three".to_string())));
        // a full queue is not a closed one
        assert!(connection.is_open());

        assert!(rx.try_recv().is_ok());
        assert!(connection.send(Message::text("four".to_string())));
    }

    #[test]
    fn test_connection_timeout() {
        let mut connection = Connection::new(1, test_addr(), sender());

        assert!(!connection.is_timed_out(Duration::from_secs(1)));

        connection.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(connection.is_timed_out(Duration::from_secs(1)));

        connection.touch();
        assert!(!connection.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_registry_creation() {
        let registry = ConnectionRegistry::new(5);
        assert_eq!(registry.max_connections, 5);
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_add_and_remove_connection() {
        let mut registry = ConnectionRegistry::new(2);

        assert!(registry.add_connection(1, test_addr(), sender()));
        assert!(registry.add_connection(2, test_addr2(), sender()));
        assert_eq!(registry.len(), 2);

        let removed = registry.remove_connection(1).unwrap();
        assert_eq!(removed.addr, test_addr());
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(1));
        assert!(registry.contains(2));
    }

    #[test]
    fn test_remove_unknown_connection() {
        let mut registry = ConnectionRegistry::new(2);
        assert!(registry.remove_connection(999).is_none());
    }

    #[test]
    fn test_add_connection_max_capacity() {
        let mut registry = ConnectionRegistry::new(1);

        assert!(registry.add_connection(1, test_addr(), sender()));
        assert!(registry.is_full());
        assert!(!registry.add_connection(2, test_addr2(), sender()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_handle_is_rejected() {
        let mut registry = ConnectionRegistry::new(4);

        assert!(registry.add_connection(7, test_addr(), sender()));
        assert!(!registry.add_connection(7, test_addr2(), sender()));
        assert_eq!(registry.get(7).unwrap().addr, test_addr());
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ConnectionRegistry::new(2);
        registry.add_connection(1, test_addr(), sender());

        assert_eq!(registry.resolve(1), None);
        assert_eq!(registry.register(1, "p1".to_string()), None);
        assert_eq!(registry.resolve(1), Some("p1"));
    }

    #[test]
    fn test_register_last_write_wins() {
        let mut registry = ConnectionRegistry::new(2);
        registry.add_connection(1, test_addr(), sender());

        registry.register(1, "p1".to_string());
        let previous = registry.register(1, "p2".to_string());

        assert_eq!(previous.as_deref(), Some("p1"));
        assert_eq!(registry.resolve(1), Some("p2"));
    }

    #[test]
    fn test_register_unknown_connection_is_ignored() {
        let mut registry = ConnectionRegistry::new(2);

        assert_eq!(registry.register(42, "p1".to_string()), None);
        assert_eq!(registry.resolve(42), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister() {
        let mut registry = ConnectionRegistry::new(2);
        registry.add_connection(1, test_addr(), sender());
        registry.register(1, "p1".to_string());

        assert_eq!(registry.unregister(1).as_deref(), Some("p1"));
        assert_eq!(registry.resolve(1), None);
        // connection stays open after leaving
        assert!(registry.contains(1));

        assert_eq!(registry.unregister(1), None);
        assert_eq!(registry.unregister(999), None);
    }

    #[test]
    fn test_removed_connection_hands_back_player_once() {
        let mut registry = ConnectionRegistry::new(2);
        registry.add_connection(1, test_addr(), sender());
        registry.register(1, "p1".to_string());

        let removed = registry.remove_connection(1).unwrap();
        assert_eq!(removed.player_id.as_deref(), Some("p1"));
        assert!(registry.remove_connection(1).is_none());
        assert_eq!(registry.resolve(1), None);
    }

    #[test]
    fn test_find_connection_by_player() {
        let mut registry = ConnectionRegistry::new(3);
        registry.add_connection(1, test_addr(), sender());
        registry.add_connection(2, test_addr2(), sender());
        registry.register(2, "p2".to_string());

        assert_eq!(registry.find_connection_by_player("p2"), Some(2));
        assert_eq!(registry.find_connection_by_player("p1"), None);
    }

    #[test]
    fn test_timed_out_connections() {
        let mut registry = ConnectionRegistry::new(3);
        registry.add_connection(1, test_addr(), sender());
        registry.add_connection(2, test_addr2(), sender());

        registry.connections.get_mut(&1).unwrap().last_seen =
            Instant::now() - Duration::from_secs(10);

        assert_eq!(registry.timed_out(Duration::from_secs(5)), vec![1]);
        // detection does not remove anything
        assert_eq!(registry.len(), 2);

        registry.touch(1);
        assert!(registry.timed_out(Duration::from_secs(5)).is_empty());
    }
}
