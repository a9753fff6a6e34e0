//! Per-tick frame loop
//!
//! Cooperative and single-threaded: the platform scheduler (animation frame
//! on web) calls [`FrameLoop::frame`] with a timestamp; everything else is
//! derived from that. The loop never suspends mid-tick.
//!
//! Authority is explicit in the session role: the host polls both input
//! streams, runs the pipeline and broadcasts the whole entity list; the guest
//! only serializes its local input and mirrors whatever board the channel
//! delivers.

use crate::input::{LocalInput, RemoteInput};
use crate::net::{InputFrame, Role};
use crate::sim::{self, Board, Entity, Msg, PlayerId};

/// Wall-clock tick timer; `dt` is the measured delta between executed ticks
#[derive(Debug, Default)]
pub struct TickClock {
    last_ms: Option<f64>,
}

impl TickClock {
    /// Milliseconds since the previous call; 0 on the first call and never
    /// negative even if the platform clock steps backwards
    pub fn dt(&mut self, now_ms: f64) -> f32 {
        let dt = match self.last_ms {
            Some(last) => (now_ms - last).max(0.0) as f32,
            None => 0.0,
        };
        self.last_ms = Some(now_ms);
        dt
    }
}

/// Throttles ticks below the display refresh rate
#[derive(Debug)]
pub struct FrameLimiter {
    interval_ms: f64,
    last_ms: Option<f64>,
}

impl FrameLimiter {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms,
            last_ms: None,
        }
    }

    /// Whether a tick may run at `now_ms`; admits at most one tick per
    /// interval
    pub fn ready(&mut self, now_ms: f64) -> bool {
        match self.last_ms {
            Some(last) if now_ms - last < self.interval_ms => false,
            _ => {
                self.last_ms = Some(now_ms);
                true
            }
        }
    }
}

/// What the glue should put on the data channel after a tick
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutput {
    /// Host: broadcast the authoritative entity list
    Snapshot(Vec<Entity>),
    /// Guest: send this tick's local input
    Input(InputFrame),
}

/// Drives one peer's per-tick work once negotiation has produced a channel
#[derive(Debug)]
pub struct FrameLoop {
    board: Board,
    role: Role,
    clock: TickClock,
    limiter: FrameLimiter,
}

impl FrameLoop {
    pub fn new(board: Board, role: Role, min_interval_ms: f64) -> Self {
        Self {
            board,
            role,
            clock: TickClock::default(),
            limiter: FrameLimiter::new(min_interval_ms),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Mirror an authoritative snapshot from the host (guest side)
    pub fn apply_snapshot(&mut self, entities: Vec<Entity>) {
        self.board.apply_snapshot(entities);
    }

    /// Run one tick if the limiter admits it. Returns what to send on the
    /// channel, or `None` when throttled.
    pub fn frame(
        &mut self,
        now_ms: f64,
        local: &mut LocalInput,
        remote: &mut RemoteInput,
    ) -> Option<FrameOutput> {
        if !self.limiter.ready(now_ms) {
            return None;
        }
        match self.role {
            Role::Host => {
                let dt = self.clock.dt(now_ms);
                let mut msg = Msg::new(std::mem::replace(&mut self.board, Board::empty(0.0, 0.0)), dt);
                msg.keys.insert(PlayerId::Host, local.keys.current());
                msg.keys.insert(PlayerId::Guest, remote.keys());
                msg.clicks
                    .extend(local.clicks.poll().into_iter().chain(remote.poll_click()));

                let out = sim::step(msg);
                // Full atomic swap; stages already returned a whole new board
                self.board = out.board;
                Some(FrameOutput::Snapshot(self.board.entities.clone()))
            }
            Role::Guest => Some(FrameOutput::Input(InputFrame::new(
                &local.keys.current(),
                local.clicks.poll(),
            ))),
        }
    }
}
