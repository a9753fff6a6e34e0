//! Fixed-order simulation pipeline
//!
//! One tick is a composition of five pure stages, each `Msg -> Msg`, applied
//! in exactly this order:
//!
//! `apply_clicks -> apply_keys -> resolve_collisions -> apply_bounce -> integrate_time`
//!
//! Velocities are board units per millisecond; `dt` is the measured wall-clock
//! delta between ticks, so a pathological stall (huge `dt`) can tunnel an
//! entity past a wall before the next bounce clamps it. That is a documented
//! boundary case, not something the pipeline special-cases.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec2;

use super::state::{Board, Click, Entity, PlayerId};
use crate::consts::*;

/// A movement key, decoded from a platform key code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
}

impl Key {
    /// Decode a DOM `keyCode`; WASD and arrow keys both map, anything else is
    /// not a movement key
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            87 | 38 => Some(Key::Up),
            83 | 40 => Some(Key::Down),
            65 | 37 => Some(Key::Left),
            68 | 39 => Some(Key::Right),
            _ => None,
        }
    }

    /// Canonical wire code (the WASD code)
    pub fn code(self) -> u32 {
        match self {
            Key::Up => 87,
            Key::Down => 83,
            Key::Left => 65,
            Key::Right => 68,
        }
    }

    /// Velocity contribution while held
    fn delta(self) -> Vec2 {
        match self {
            Key::Up => Vec2::new(0.0, MOVE_SPEED),
            Key::Down => Vec2::new(0.0, -MOVE_SPEED),
            Key::Left => Vec2::new(-MOVE_SPEED, 0.0),
            Key::Right => Vec2::new(MOVE_SPEED, 0.0),
        }
    }
}

/// Per-tick envelope threaded through the pipeline stages
///
/// Built fresh by the frame loop each tick, consumed by `step`. Never
/// persisted.
#[derive(Debug, Clone)]
pub struct Msg {
    pub board: Board,
    /// Milliseconds since the previous tick, always >= 0
    pub dt: f32,
    /// Currently pressed movement keys per player
    pub keys: BTreeMap<PlayerId, BTreeSet<Key>>,
    /// Clicks captured since the previous tick (at most one per peer)
    pub clicks: Vec<Click>,
}

impl Msg {
    pub fn new(board: Board, dt: f32) -> Self {
        Self {
            board,
            dt,
            keys: BTreeMap::new(),
            clicks: Vec::new(),
        }
    }
}

/// Spawn one projectile per click, at the firing player's edge, moving toward
/// the click point at fixed speed
///
/// A click whose owner is no longer on the board is a no-op, as is a click on
/// the owner's own center (no direction to aim).
pub fn apply_clicks(mut msg: Msg) -> Msg {
    let mut spawned = Vec::new();
    for click in &msg.clicks {
        let Some(owner) = msg.board.entity(click.owner) else {
            continue;
        };
        let rel = Vec2::new(click.x, click.y) - owner.pos();
        let Some(dir) = rel.try_normalize() else {
            continue;
        };
        let spawn = owner.pos() + dir * (owner.r + PROJECTILE_SPAWN_GAP);
        spawned.push(Entity::projectile(spawn, dir * PROJECTILE_SPEED));
    }
    msg.board.entities.extend(spawned);
    msg
}

/// Recompute each keyed player's velocity from its currently pressed keys
///
/// The velocity is rebuilt from zero by summing per-key deltas, so opposing
/// keys cancel. Players with no entry in `keys` keep their velocity unchanged.
pub fn apply_keys(mut msg: Msg) -> Msg {
    for (id, keys) in &msg.keys {
        let Some(entity) = msg.board.entities.iter_mut().find(|e| e.id == Some(*id)) else {
            continue;
        };
        let vel: Vec2 = keys.iter().map(|k| k.delta()).sum();
        entity.vx = vel.x;
        entity.vy = vel.y;
    }
    msg
}

/// Remove every entity that overlaps any other entity
///
/// Destruction is mutual: both participants of an overlap are removed in the
/// same pass, players and projectiles alike. The relation is irreflexive; an
/// entity never collides with itself.
pub fn resolve_collisions(mut msg: Msg) -> Msg {
    let entities = &msg.board.entities;
    let survivors: Vec<Entity> = entities
        .iter()
        .enumerate()
        .filter(|(i, a)| {
            !entities
                .iter()
                .enumerate()
                .any(|(j, b)| *i != j && a.overlaps(b))
        })
        .map(|(_, e)| e.clone())
        .collect();
    msg.board.entities = survivors;
    msg
}

/// Clamp positions into the board and reflect velocity off any wall the
/// entity's edge crosses (magnitude preserved, sign flipped)
pub fn apply_bounce(mut msg: Msg) -> Msg {
    let (w, h) = (msg.board.width, msg.board.height);
    for e in &mut msg.board.entities {
        if e.x - e.r < 0.0 {
            e.vx = e.vx.abs();
        } else if e.x + e.r > w {
            e.vx = -e.vx.abs();
        }
        if e.y - e.r < 0.0 {
            e.vy = e.vy.abs();
        } else if e.y + e.r > h {
            e.vy = -e.vy.abs();
        }
        e.x = e.x.clamp(0.0, w);
        e.y = e.y.clamp(0.0, h);
    }
    msg
}

/// Advance positions by `velocity * dt`
pub fn integrate_time(mut msg: Msg) -> Msg {
    let dt = msg.dt;
    for e in &mut msg.board.entities {
        e.x += e.vx * dt;
        e.y += e.vy * dt;
    }
    msg
}

/// One full tick: the five stages composed in their fixed order
pub fn step(msg: Msg) -> Msg {
    const STAGES: [fn(Msg) -> Msg; 5] = [
        apply_clicks,
        apply_keys,
        resolve_collisions,
        apply_bounce,
        integrate_time,
    ];
    STAGES.iter().fold(msg, |m, stage| stage(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn board_with(entities: Vec<Entity>) -> Board {
        Board {
            width: 800.0,
            height: 600.0,
            entities,
        }
    }

    fn player_at(id: PlayerId, x: f32, y: f32) -> Entity {
        Entity::player(id, x, y, "red")
    }

    #[test]
    fn test_up_key_moves_player_up() {
        let board = board_with(vec![player_at(PlayerId::Host, 10.0, 10.0)]);
        let mut msg = Msg::new(board, 16.0);
        msg.keys
            .insert(PlayerId::Host, BTreeSet::from([Key::Up]));

        let out = step(msg);
        let host = out.board.entity(PlayerId::Host).unwrap();
        assert!((host.y - 13.2).abs() < 1e-5, "y was {}", host.y);
        assert_eq!(host.x, 10.0);
    }

    #[test]
    fn test_opposing_keys_cancel() {
        let board = board_with(vec![player_at(PlayerId::Host, 100.0, 100.0)]);
        let mut msg = Msg::new(board, 16.0);
        msg.keys
            .insert(PlayerId::Host, BTreeSet::from([Key::Up, Key::Down, Key::Right]));

        let out = apply_keys(msg);
        let host = out.board.entity(PlayerId::Host).unwrap();
        assert_eq!(host.vy, 0.0);
        assert_eq!(host.vx, MOVE_SPEED);
    }

    #[test]
    fn test_unkeyed_player_keeps_velocity() {
        let mut e = player_at(PlayerId::Host, 100.0, 100.0);
        e.vx = 0.05;
        e.vy = -0.05;
        let msg = Msg::new(board_with(vec![e]), 16.0);

        let out = apply_keys(msg);
        let host = out.board.entity(PlayerId::Host).unwrap();
        assert_eq!(host.vx, 0.05);
        assert_eq!(host.vy, -0.05);
    }

    #[test]
    fn test_click_spawns_aimed_projectile() {
        let board = board_with(vec![player_at(PlayerId::Host, 0.0, 0.0)]);
        let mut msg = Msg::new(board, 0.0);
        msg.clicks.push(Click {
            owner: PlayerId::Host,
            x: 50.0,
            y: 50.0,
        });

        let out = apply_clicks(msg);
        assert_eq!(out.board.entities.len(), 2);
        let bullet = &out.board.entities[1];
        assert!(bullet.id.is_none());

        let dir = Vec2::new(50.0, 50.0).normalize();
        let expected_vel = dir * PROJECTILE_SPEED;
        assert!((bullet.vx - expected_vel.x).abs() < 1e-5);
        assert!((bullet.vy - expected_vel.y).abs() < 1e-5);

        // Spawned outside the firing player's edge, so the next collision
        // pass doesn't destroy them both
        let owner = &out.board.entities[0];
        assert!(!bullet.overlaps(owner));
    }

    #[test]
    fn test_click_without_owner_is_noop() {
        let board = board_with(vec![player_at(PlayerId::Host, 0.0, 0.0)]);
        let mut msg = Msg::new(board, 0.0);
        msg.clicks.push(Click {
            owner: PlayerId::Guest,
            x: 50.0,
            y: 50.0,
        });

        let out = apply_clicks(msg);
        assert_eq!(out.board.entities.len(), 1);
    }

    #[test]
    fn test_click_on_own_center_is_noop() {
        let board = board_with(vec![player_at(PlayerId::Host, 50.0, 50.0)]);
        let mut msg = Msg::new(board, 0.0);
        msg.clicks.push(Click {
            owner: PlayerId::Host,
            x: 50.0,
            y: 50.0,
        });

        let out = apply_clicks(msg);
        assert_eq!(out.board.entities.len(), 1);
    }

    #[test]
    fn test_collision_mutual_destruction() {
        // Radii 10 each at distance 15: 15^2 < 20^2, both removed
        let board = board_with(vec![
            player_at(PlayerId::Host, 0.0, 0.0),
            player_at(PlayerId::Guest, 15.0, 0.0),
        ]);
        let out = resolve_collisions(Msg::new(board, 0.0));
        assert!(out.board.entities.is_empty());

        // At distance 25: 25^2 > 20^2, both survive
        let board = board_with(vec![
            player_at(PlayerId::Host, 0.0, 0.0),
            player_at(PlayerId::Guest, 25.0, 0.0),
        ]);
        let out = resolve_collisions(Msg::new(board, 0.0));
        assert_eq!(out.board.entities.len(), 2);
    }

    #[test]
    fn test_lone_entity_never_self_collides() {
        let board = board_with(vec![player_at(PlayerId::Host, 0.0, 0.0)]);
        let out = resolve_collisions(Msg::new(board, 0.0));
        assert_eq!(out.board.entities.len(), 1);
    }

    #[test]
    fn test_bounce_reflects_at_walls() {
        let mut left = player_at(PlayerId::Host, 5.0, 300.0);
        left.vx = -0.2;
        let mut top = player_at(PlayerId::Guest, 400.0, 595.0);
        top.vy = 0.2;
        let board = board_with(vec![left, top]);

        let out = apply_bounce(Msg::new(board, 0.0));
        assert_eq!(out.board.entities[0].vx, 0.2);
        assert_eq!(out.board.entities[1].vy, -0.2);
    }

    #[test]
    fn test_bounce_clamps_runaway_position() {
        let mut e = player_at(PlayerId::Host, -50.0, 700.0);
        e.vx = -0.2;
        e.vy = 0.2;
        let out = apply_bounce(Msg::new(board_with(vec![e]), 0.0));
        let host = out.board.entity(PlayerId::Host).unwrap();
        assert_eq!(host.x, 0.0);
        assert_eq!(host.y, 600.0);
        assert_eq!(host.vx, 0.2);
        assert_eq!(host.vy, -0.2);
    }

    #[test]
    fn test_zero_dt_is_identity_for_positions() {
        let mut e = player_at(PlayerId::Host, 123.0, 456.0);
        e.vx = 0.2;
        e.vy = -0.2;
        let before = board_with(vec![e]);
        let out = integrate_time(Msg::new(before.clone(), 0.0));
        assert_eq!(out.board, before);
    }

    #[test]
    fn test_step_order_click_then_integrate() {
        // A click's projectile must be spawned, collision-checked, bounced
        // and integrated in the same tick
        let board = board_with(vec![player_at(PlayerId::Host, 100.0, 100.0)]);
        let mut msg = Msg::new(board, 10.0);
        msg.clicks.push(Click {
            owner: PlayerId::Host,
            x: 200.0,
            y: 100.0,
        });

        let out = step(msg);
        assert_eq!(out.board.entities.len(), 2);
        let bullet = &out.board.entities[1];
        // Spawned at x = 100 + 14, then integrated 0.4 * 10 further
        assert!((bullet.x - 118.0).abs() < 1e-4, "x was {}", bullet.x);
    }

    fn arb_entity() -> impl Strategy<Value = Entity> {
        (
            -1000.0f32..1000.0,
            -1000.0f32..1000.0,
            -1.0f32..1.0,
            -1.0f32..1.0,
            0.5f32..20.0,
        )
            .prop_map(|(x, y, vx, vy, r)| Entity {
                id: None,
                r,
                x,
                y,
                vx,
                vy,
                color: "black".to_string(),
            })
    }

    proptest! {
        #[test]
        fn prop_collision_is_symmetric(entities in prop::collection::vec(arb_entity(), 0..8)) {
            let board = board_with(entities.clone());
            let out = resolve_collisions(Msg::new(board, 0.0));

            // An entity survives iff it overlapped nobody; so for every
            // removed A there was a B it overlapped, and that B is gone too
            for (i, a) in entities.iter().enumerate() {
                let overlapped: Vec<usize> = entities
                    .iter()
                    .enumerate()
                    .filter(|(j, b)| i != *j && a.overlaps(b))
                    .map(|(j, _)| j)
                    .collect();
                let survived = out.board.entities.contains(a);
                prop_assert_eq!(survived, overlapped.is_empty());
                for j in overlapped {
                    prop_assert!(!out.board.entities.contains(&entities[j]));
                }
            }
        }

        #[test]
        fn prop_bounce_contains_positions(entities in prop::collection::vec(arb_entity(), 0..8)) {
            let out = apply_bounce(Msg::new(board_with(entities), 0.0));
            for e in &out.board.entities {
                prop_assert!(e.x >= 0.0 && e.x <= out.board.width);
                prop_assert!(e.y >= 0.0 && e.y <= out.board.height);
            }
        }

        #[test]
        fn prop_integrate_zero_dt_identity(entities in prop::collection::vec(arb_entity(), 0..8)) {
            let board = board_with(entities);
            let out = integrate_time(Msg::new(board.clone(), 0.0));
            prop_assert_eq!(out.board, board);
        }
    }
}
