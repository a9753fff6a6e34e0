//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Stable iteration order (entities in insertion order, keys in `BTreeMap` order)
//! - Seeded RNG only (board setup)
//! - No rendering or platform dependencies
//!
//! Both peers link the same pipeline, but only the authoritative host runs it
//! each tick; the guest mirrors the host's broadcast snapshots.

pub mod pipeline;
pub mod state;

pub use pipeline::{
    Key, Msg, apply_bounce, apply_clicks, apply_keys, integrate_time, resolve_collisions, step,
};
pub use state::{Board, Click, Entity, PlayerId};
