//! Session broadcaster: applies client messages to the shared world and
//! republishes the full player set after every change.
//!
//! A [`Session`] is plain owned state with synchronous methods. The network
//! layer drives one instance from a single task, so each event (open, frame,
//! close, idle sweep) is applied and fanned out before the next one starts.
//! Tests drive it directly with in-memory channels standing in for sockets.

use crate::connection_registry::{ConnectionId, ConnectionRegistry};
use crate::game::GameState;
use log::{debug, error, info, warn};
use shared::{Appearance, ClientMessage, ServerMessage, Vec3};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

pub struct Session {
    game_state: GameState,
    registry: ConnectionRegistry,
}

impl Session {
    pub fn new(max_connections: usize) -> Self {
        Self {
            game_state: GameState::new(),
            registry: ConnectionRegistry::new(max_connections),
        }
    }

    /// Admits a freshly accepted connection and greets it with `CONNECTED`
    ///
    /// Over capacity the connection is sent a close frame instead and is never
    /// tracked. Returns whether the connection was admitted.
    pub fn open(
        &mut self,
        id: ConnectionId,
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
    ) -> bool {
        if self.registry.is_full() {
            warn!(
                "Rejecting connection {} from {}: server full ({} connections)",
                id,
                addr,
                self.registry.len()
            );
            let _ = sender.try_send(close_frame(CloseCode::Again, "Server full"));
            return false;
        }

        if !self.registry.add_connection(id, addr, sender) {
            warn!("Connection {} is already open, ignoring duplicate", id);
            return false;
        }

        match ServerMessage::Connected.to_json() {
            Ok(json) => {
                if let Some(connection) = self.registry.get(id) {
                    connection.send(Message::text(json));
                }
            }
            Err(e) => error!("Failed to serialize greeting for connection {}: {}", id, e),
        }
        true
    }

    /// Decodes one text frame and applies it
    ///
    /// Malformed frames are logged and dropped; the connection stays open.
    /// Returns whether a snapshot was broadcast.
    pub fn handle_text(&mut self, id: ConnectionId, text: &str) -> bool {
        self.registry.touch(id);

        match ClientMessage::from_json(text) {
            Ok(message) => self.handle_message(id, message),
            Err(e) => {
                warn!("Dropping malformed message from connection {}: {}", id, e);
                false
            }
        }
    }

    /// Applies a decoded message and broadcasts a snapshot if it changed the world
    pub fn handle_message(&mut self, id: ConnectionId, message: ClientMessage) -> bool {
        if !self.registry.contains(id) {
            debug!(
                "Ignoring {} from connection {} that is not open",
                message.kind(),
                id
            );
            return false;
        }

        debug!("Connection {} sent {}", id, message.kind());

        let changed = match message {
            ClientMessage::Join {
                player_id,
                username,
            } => self.join(id, player_id, username),
            ClientMessage::Move {
                player_id,
                position,
                rotation,
            } => self.move_player(id, &player_id, position, rotation),
            ClientMessage::Appearance {
                player_id,
                appearance,
            } => self.update_appearance(id, &player_id, appearance),
            ClientMessage::Leave { player_id } => self.leave(id, &player_id),
            ClientMessage::Unknown => {
                warn!("Dropping message of unknown type from connection {}", id);
                false
            }
        };

        if changed {
            self.broadcast_snapshot();
        }
        changed
    }

    /// Transport-level close: removes the connection and its player
    ///
    /// Safe to call repeatedly; only the first call for a connection has any
    /// effect. Returns whether a snapshot was broadcast.
    pub fn close(&mut self, id: ConnectionId) -> bool {
        let Some(connection) = self.registry.remove_connection(id) else {
            return false;
        };

        match connection.player_id {
            Some(player_id) => {
                info!("Player {} disconnected", player_id);
                self.game_state.remove_player(&player_id);
                self.broadcast_snapshot();
                true
            }
            None => false,
        }
    }

    /// Records inbound activity that carries no message (ping, pong, binary)
    pub fn touch(&mut self, id: ConnectionId) {
        self.registry.touch(id);
    }

    /// Closes every connection silent for longer than `timeout`
    ///
    /// Each evicted connection goes through [`Session::close`], so its player
    /// is removed and the remaining clients get a fresh snapshot.
    pub fn evict_idle(&mut self, timeout: Duration) -> Vec<ConnectionId> {
        let idle = self.registry.timed_out(timeout);

        for &id in &idle {
            if let Some(connection) = self.registry.get(id) {
                info!(
                    "Evicting connection {} from {} after {:?} of silence",
                    id, connection.addr, timeout
                );
                connection.send(close_frame(CloseCode::Away, "Idle timeout"));
            }
            self.close(id);
        }

        idle
    }

    /// Serializes the full player set once and queues it on every open connection
    ///
    /// Connections whose writer is gone or whose queue is full are skipped; the
    /// next snapshot supersedes the dropped one. Returns the number of
    /// connections the snapshot was queued for.
    pub fn broadcast_snapshot(&self) -> usize {
        let json = match self.snapshot().to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize game state: {}", e);
                return 0;
            }
        };
        let message = Message::text(json);

        let mut delivered = 0;
        for connection in self.registry.connections() {
            if connection.send(message.clone()) {
                delivered += 1;
            } else {
                debug!(
                    "Skipping snapshot for connection {}: writer closed or behind",
                    connection.id
                );
            }
        }

        debug!(
            "Broadcast snapshot of {} players to {} connections",
            self.game_state.len(),
            delivered
        );
        delivered
    }

    pub fn snapshot(&self) -> ServerMessage {
        ServerMessage::GameState {
            players: self.game_state.snapshot(),
        }
    }

    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    pub fn resolve(&self, id: ConnectionId) -> Option<&str> {
        self.registry.resolve(id)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    fn join(&mut self, id: ConnectionId, player_id: String, username: String) -> bool {
        // A connection speaks for one player: re-joining under a new id drops the old one.
        if let Some(previous) = self.registry.resolve(id).map(str::to_owned) {
            if previous != player_id {
                self.game_state.remove_player(&previous);
            }
        }

        // The newest connection to join as an id owns it.
        if let Some(owner) = self.registry.find_connection_by_player(&player_id) {
            if owner != id {
                info!(
                    "Player {} moved from connection {} to {}",
                    player_id, owner, id
                );
                self.registry.unregister(owner);
            }
        }

        self.game_state.add_player(player_id.clone(), username);
        self.registry.register(id, player_id);
        true
    }

    fn move_player(
        &mut self,
        id: ConnectionId,
        player_id: &str,
        position: Vec3,
        rotation: Vec3,
    ) -> bool {
        if self.registry.resolve(id).is_none() {
            debug!("Ignoring MOVE from connection {} before JOIN", id);
            return false;
        }
        self.game_state.move_player(player_id, position, rotation)
    }

    fn update_appearance(
        &mut self,
        id: ConnectionId,
        player_id: &str,
        appearance: Appearance,
    ) -> bool {
        if self.registry.resolve(id).is_none() {
            debug!("Ignoring APPEARANCE from connection {} before JOIN", id);
            return false;
        }
        self.game_state.update_appearance(player_id, appearance)
    }

    fn leave(&mut self, id: ConnectionId, player_id: &str) -> bool {
        let Some(registered) = self.registry.unregister(id) else {
            debug!("Ignoring LEAVE for {} from connection {} that never joined", player_id, id);
            return false;
        };

        if registered != player_id {
            debug!(
                "Connection {} sent LEAVE for {} but is registered as {}",
                id, player_id, registered
            );
        }

        info!("Player {} left", registered);
        self.game_state.remove_player(&registered).is_some()
    }
}

fn close_frame(code: CloseCode, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}
