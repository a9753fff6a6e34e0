//! Board and entity types
//!
//! Entities are flat structs whose serde view is exactly the snapshot wire
//! format the host broadcasts each tick (`[{id?, r, x, y, vx, vy, color}, ..]`).

use glam::Vec2;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Stable identity of the two players
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerId {
    Host,
    Guest,
}

impl PlayerId {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerId::Host => "host",
            PlayerId::Guest => "guest",
        }
    }
}

/// A click event in simulation space (Y up), tagged with the player that fired it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Click {
    #[serde(rename = "entityId")]
    pub owner: PlayerId,
    pub x: f32,
    pub y: f32,
}

/// A player (has an id) or a projectile (no id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<PlayerId>,
    pub r: f32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub color: String,
}

impl Entity {
    /// A player circle with zero velocity
    pub fn player(id: PlayerId, x: f32, y: f32, color: &str) -> Self {
        Self {
            id: Some(id),
            r: PLAYER_RADIUS,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            color: color.to_string(),
        }
    }

    /// An anonymous projectile
    pub fn projectile(pos: Vec2, vel: Vec2) -> Self {
        Self {
            id: None,
            r: PROJECTILE_RADIUS,
            x: pos.x,
            y: pos.y,
            vx: vel.x,
            vy: vel.y,
            color: "black".to_string(),
        }
    }

    pub fn is_player(&self) -> bool {
        self.id.is_some()
    }

    #[inline]
    pub fn pos(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    #[inline]
    pub fn vel(&self) -> Vec2 {
        Vec2::new(self.vx, self.vy)
    }

    /// Circle overlap test (strict: touching circles do not collide)
    #[inline]
    pub fn overlaps(&self, other: &Entity) -> bool {
        let sum_r = self.r + other.r;
        self.pos().distance_squared(other.pos()) < sum_r * sum_r
    }
}

/// One peer's view of the shared game state
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    pub width: f32,
    pub height: f32,
    pub entities: Vec<Entity>,
}

impl Board {
    /// Empty board (guest side, before the first snapshot arrives)
    pub fn empty(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            entities: Vec::new(),
        }
    }

    /// Starting board: host on the left edge, guest on the right, at a
    /// seeded-random height
    pub fn new(width: f32, height: f32, seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let entities = vec![
            Entity::player(
                PlayerId::Host,
                width / 8.0,
                rng.random::<f32>() * height,
                "red",
            ),
            Entity::player(
                PlayerId::Guest,
                width * 7.0 / 8.0,
                rng.random::<f32>() * height,
                "yellow",
            ),
        ];
        Self {
            width,
            height,
            entities,
        }
    }

    pub fn entity(&self, id: PlayerId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == Some(id))
    }

    /// Replace all entities with an authoritative snapshot from the host
    pub fn apply_snapshot(&mut self, entities: Vec<Entity>) {
        self.entities = entities;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_board_player_placement() {
        let board = Board::new(800.0, 600.0, 7);
        let host = board.entity(PlayerId::Host).unwrap();
        let guest = board.entity(PlayerId::Guest).unwrap();

        assert_eq!(host.x, 100.0);
        assert_eq!(guest.x, 700.0);
        assert!(host.y >= 0.0 && host.y <= 600.0);
        assert!(guest.y >= 0.0 && guest.y <= 600.0);
        assert_eq!(host.color, "red");
        assert_eq!(guest.color, "yellow");
    }

    #[test]
    fn test_board_setup_is_seeded() {
        let a = Board::new(800.0, 600.0, 42);
        let b = Board::new(800.0, 600.0, 42);
        let c = Board::new(800.0, 600.0, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_overlap_strict() {
        let a = Entity::player(PlayerId::Host, 0.0, 0.0, "red");
        let mut b = Entity::player(PlayerId::Guest, 20.0, 0.0, "yellow");
        // Touching exactly (distance == sum of radii) is not a collision
        assert!(!a.overlaps(&b));
        b.x = 19.9;
        assert!(a.overlaps(&b));
    }

    #[test]
    fn test_entity_wire_shape() {
        let p = Entity::player(PlayerId::Host, 1.0, 2.0, "red");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["id"], "host");
        assert_eq!(json["r"], 10.0);

        let b = Entity::projectile(Vec2::new(1.0, 2.0), Vec2::new(0.1, 0.2));
        let json = serde_json::to_value(&b).unwrap();
        // Projectiles carry no id field at all
        assert!(json.get("id").is_none());
        assert_eq!(json["color"], "black");
    }
}
