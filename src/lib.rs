//! Peer Duel - a two-player circle shooter over a WebRTC data channel
//!
//! Core modules:
//! - `sim`: Deterministic per-tick simulation pipeline (movement, projectiles, collisions)
//! - `input`: Pull-based local/remote input streams
//! - `net`: Signaling wire format and the peer negotiation state machine
//! - `game`: Per-tick frame loop driver (host authority, guest mirror)
//! - `config`: Tunables persisted in LocalStorage

pub mod config;
pub mod game;
pub mod input;
pub mod net;
pub mod sim;

pub use config::GameConfig;
pub use sim::{Board, Click, Entity, Key, Msg, PlayerId};

/// Game configuration constants
pub mod consts {
    /// Player movement speed (board units per millisecond)
    pub const MOVE_SPEED: f32 = 0.2;
    /// Projectile speed (board units per millisecond)
    pub const PROJECTILE_SPEED: f32 = 0.4;
    /// Projectile radius
    pub const PROJECTILE_RADIUS: f32 = 3.0;
    /// Gap between a player's edge and the center of a projectile it fires
    pub const PROJECTILE_SPAWN_GAP: f32 = 4.0;
    /// Player radius
    pub const PLAYER_RADIUS: f32 = 10.0;

    /// Default board dimensions (overridden by the canvas size on web)
    pub const BOARD_WIDTH: f32 = 800.0;
    pub const BOARD_HEIGHT: f32 = 600.0;

    /// How often the offerer re-announces its offer until answered (ms)
    pub const OFFER_RESEND_INTERVAL_MS: f64 = 500.0;
    /// Minimum interval between simulation ticks (ms) - throttles below
    /// display refresh rate
    pub const MIN_FRAME_INTERVAL_MS: f64 = 10.0;

    /// Clicks retained between polls; newest wins, oldest evicted
    pub const CLICK_BUFFER_CAP: usize = 8;
}
