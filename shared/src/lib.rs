//! Wire protocol shared by the relay server, the test client and the
//! integration tests.
//!
//! Every frame is a single JSON object carrying a `type` discriminator.
//! Clients send [`ClientMessage`]s, the server answers with
//! [`ServerMessage`]s.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_PATH: &str = "/ws";

/// Cosmetic attribute name to value, e.g. `shirtColor -> "#ff0000"`.
pub type Appearance = HashMap<String, String>;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub id: String,
    pub username: String,
    pub position: Vec3,
    pub rotation: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appearance: Option<Appearance>,
}

impl Player {
    /// A freshly joined player standing at the origin with no appearance.
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            appearance: None,
        }
    }

    /// Merges `updates` over the current appearance. Keys not present in
    /// `updates` keep their previous value.
    pub fn merge_appearance(&mut self, updates: Appearance) {
        self.appearance
            .get_or_insert_with(Appearance::new)
            .extend(updates);
    }
}

/// Messages sent from a client to the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Join { player_id: String, username: String },
    #[serde(rename_all = "camelCase")]
    Move {
        player_id: String,
        position: Vec3,
        rotation: Vec3,
    },
    #[serde(rename_all = "camelCase")]
    Appearance {
        player_id: String,
        appearance: Appearance,
    },
    #[serde(rename_all = "camelCase")]
    Leave { player_id: String },
    /// Any well-formed object whose `type` is not one of the above.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of the message type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "JOIN",
            ClientMessage::Move { .. } => "MOVE",
            ClientMessage::Appearance { .. } => "APPEARANCE",
            ClientMessage::Leave { .. } => "LEAVE",
            ClientMessage::Unknown => "UNKNOWN",
        }
    }
}

/// Messages sent from the server to every client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Sent once, right after the transport opens.
    Connected,
    /// Full snapshot of every joined player.
    GameState { players: Vec<Player> },
}

impl ServerMessage {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
