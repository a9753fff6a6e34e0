//! Pull-based input streams
//!
//! Event listeners (or channel message handlers) are the single writer into
//! each buffer; the frame loop is the single reader, polling once per tick.
//! Two contracts, matching the two kinds of input:
//!
//! - Keys are level-triggered: reading yields the *current* pressed set and
//!   is idempotent.
//! - Clicks are edge-triggered: a bounded buffer where the newest click wins;
//!   polling consumes it and discards anything older that piled up between
//!   ticks. Low latency is deliberately favored over completeness here.

use std::collections::{BTreeSet, VecDeque};

use crate::consts::CLICK_BUFFER_CAP;
use crate::sim::{Click, Key, PlayerId};

/// Live set of currently held movement keys
#[derive(Debug, Default, Clone)]
pub struct KeySet {
    pressed: BTreeSet<Key>,
}

impl KeySet {
    /// Register a keydown; non-movement codes are ignored
    pub fn press_code(&mut self, code: u32) {
        if let Some(key) = Key::from_code(code) {
            self.pressed.insert(key);
        }
    }

    pub fn release_code(&mut self, code: u32) {
        if let Some(key) = Key::from_code(code) {
            self.pressed.remove(&key);
        }
    }

    /// Current pressed set; reading does not modify the set
    pub fn current(&self) -> BTreeSet<Key> {
        self.pressed.clone()
    }
}

/// Bounded click buffer, newest-wins
#[derive(Debug)]
pub struct ClickBuffer {
    queue: VecDeque<Click>,
    cap: usize,
}

impl Default for ClickBuffer {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            cap: CLICK_BUFFER_CAP,
        }
    }
}

impl ClickBuffer {
    /// Enqueue a click; when full the oldest is evicted
    pub fn push(&mut self, click: Click) {
        if self.queue.len() == self.cap {
            self.queue.pop_front();
        }
        self.queue.push_back(click);
    }

    /// Take the newest pending click and drop the rest; `None` when empty.
    /// Never blocks.
    pub fn poll(&mut self) -> Option<Click> {
        let newest = self.queue.pop_back();
        self.queue.clear();
        newest
    }
}

/// Local player's input state, written by DOM listeners
#[derive(Debug, Default)]
pub struct LocalInput {
    pub keys: KeySet,
    pub clicks: ClickBuffer,
    /// Which player this peer controls; tags outgoing clicks
    pub player: Option<PlayerId>,
}

impl LocalInput {
    pub fn for_player(player: PlayerId) -> Self {
        Self {
            player: Some(player),
            ..Self::default()
        }
    }

    /// Record a click already converted to simulation space (Y up)
    pub fn click(&mut self, x: f32, y: f32) {
        let Some(owner) = self.player else {
            return;
        };
        self.clicks.push(Click { owner, x, y });
    }
}

/// Remote peer's input, fed from decoded data-channel frames
#[derive(Debug, Default)]
pub struct RemoteInput {
    keys: BTreeSet<Key>,
    clicks: ClickBuffer,
}

impl RemoteInput {
    /// Apply one decoded input frame: the key set replaces the previous one
    /// (latest-wins), a click is queued
    pub fn push_frame(&mut self, keys: BTreeSet<Key>, click: Option<Click>) {
        self.keys = keys;
        if let Some(click) = click {
            self.clicks.push(click);
        }
    }

    /// Most recently received key set; sticky until the next frame replaces it
    pub fn keys(&self) -> BTreeSet<Key> {
        self.keys.clone()
    }

    pub fn poll_click(&mut self) -> Option<Click> {
        self.clicks.poll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_at(x: f32) -> Click {
        Click {
            owner: PlayerId::Guest,
            x,
            y: 0.0,
        }
    }

    #[test]
    fn test_keyset_level_triggered() {
        let mut keys = KeySet::default();
        keys.press_code(87); // W
        keys.press_code(37); // ArrowLeft
        keys.press_code(13); // Enter: not a movement key
        assert_eq!(keys.current(), BTreeSet::from([Key::Up, Key::Left]));
        // Reading again yields the same set
        assert_eq!(keys.current(), BTreeSet::from([Key::Up, Key::Left]));

        keys.release_code(87);
        assert_eq!(keys.current(), BTreeSet::from([Key::Left]));
    }

    #[test]
    fn test_repeat_keydown_is_idempotent() {
        let mut keys = KeySet::default();
        keys.press_code(68);
        keys.press_code(68);
        assert_eq!(keys.current().len(), 1);
    }

    #[test]
    fn test_click_buffer_newest_wins() {
        let mut buf = ClickBuffer::default();
        buf.push(click_at(1.0));
        buf.push(click_at(2.0));
        buf.push(click_at(3.0));

        assert_eq!(buf.poll(), Some(click_at(3.0)));
        // Older clicks from the same window were dropped
        assert_eq!(buf.poll(), None);
    }

    #[test]
    fn test_click_buffer_eviction_at_cap() {
        let mut buf = ClickBuffer::default();
        for i in 0..(CLICK_BUFFER_CAP + 5) {
            buf.push(click_at(i as f32));
        }
        assert_eq!(
            buf.poll(),
            Some(click_at((CLICK_BUFFER_CAP + 4) as f32))
        );
    }

    #[test]
    fn test_remote_keys_sticky_between_frames() {
        let mut remote = RemoteInput::default();
        remote.push_frame(BTreeSet::from([Key::Right]), None);
        assert_eq!(remote.keys(), BTreeSet::from([Key::Right]));
        // No new frame: last known set still applies
        assert_eq!(remote.keys(), BTreeSet::from([Key::Right]));

        remote.push_frame(BTreeSet::new(), Some(click_at(9.0)));
        assert!(remote.keys().is_empty());
        assert_eq!(remote.poll_click(), Some(click_at(9.0)));
        assert_eq!(remote.poll_click(), None);
    }

    #[test]
    fn test_local_click_tagged_with_player() {
        let mut local = LocalInput::for_player(PlayerId::Host);
        local.click(10.0, 20.0);
        let click = local.clicks.poll().unwrap();
        assert_eq!(click.owner, PlayerId::Host);

        // Without an assigned player, clicks are discarded
        let mut unassigned = LocalInput::default();
        unassigned.click(10.0, 20.0);
        assert_eq!(unassigned.clicks.poll(), None);
    }
}
