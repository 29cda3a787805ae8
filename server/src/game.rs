use log::{debug, info};
use shared::{Appearance, Player, Vec3};
use std::collections::HashMap;

/// The shared world: every joined player keyed by its client-chosen id
#[derive(Debug, Clone, Default)]
pub struct GameState {
    pub players: HashMap<String, Player>,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
        }
    }

    /// Creates the player at the origin, replacing any previous record with the same id
    pub fn add_player(&mut self, player_id: String, username: String) {
        info!("Player {} ({}) joined", username, player_id);
        let player = Player::new(player_id.clone(), username);
        self.players.insert(player_id, player);
    }

    pub fn remove_player(&mut self, player_id: &str) -> Option<Player> {
        let player = self.players.remove(player_id)?;
        info!("Removed player {} ({})", player.username, player.id);
        Some(player)
    }

    /// Overwrites the transform of an existing player. Unknown ids are ignored.
    pub fn move_player(&mut self, player_id: &str, position: Vec3, rotation: Vec3) -> bool {
        match self.players.get_mut(player_id) {
            Some(player) => {
                player.position = position;
                player.rotation = rotation;
                true
            }
            None => {
                debug!("Ignoring move for unknown player {}", player_id);
                false
            }
        }
    }

    pub fn update_appearance(&mut self, player_id: &str, appearance: Appearance) -> bool {
        match self.players.get_mut(player_id) {
            Some(player) => {
                player.merge_appearance(appearance);
                true
            }
            None => {
                debug!("Ignoring appearance for unknown player {}", player_id);
                false
            }
        }
    }

    pub fn get_player(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id)
    }

    /// Copy of every player, in no particular order
    pub fn snapshot(&self) -> Vec<Player> {
        self.players.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
