//! JSON wire formats for the relay and the data channel
//!
//! Relay messages are room-scoped broadcasts; every field is optional so a
//! single envelope type covers presence announcements, offers, answers and
//! candidates. Data-channel payloads are either a guest input frame (object)
//! or a host board snapshot (bare entity array), distinguished by shape.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::sim::{Click, Entity, Key};

/// An SDP offer or answer as exchanged over the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// "offer" or "answer"
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "offer".to_string(),
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "answer".to_string(),
            sdp: sdp.into(),
        }
    }
}

/// A network path candidate; may arrive before or after descriptions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescriptor {
    pub candidate: String,
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none", default)]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub sdp_m_line_index: Option<u16>,
}

/// Relay message; any subset of fields may be present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub to: Option<String>,
    /// Presence announcement: the announcing peer's id
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub connected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub offer: Option<SessionDescription>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub answer: Option<SessionDescription>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub candidate: Option<CandidateDescriptor>,
}

impl SignalEnvelope {
    pub fn hello(from: &str) -> Self {
        Self {
            from: Some(from.to_string()),
            connected: Some(from.to_string()),
            ..Self::default()
        }
    }

    pub fn offer(from: &str, to: Option<&str>, desc: SessionDescription) -> Self {
        Self {
            from: Some(from.to_string()),
            to: to.map(str::to_string),
            offer: Some(desc),
            ..Self::default()
        }
    }

    pub fn answer(from: &str, to: &str, desc: SessionDescription) -> Self {
        Self {
            from: Some(from.to_string()),
            to: Some(to.to_string()),
            answer: Some(desc),
            ..Self::default()
        }
    }

    pub fn candidate(from: &str, to: Option<&str>, candidate: CandidateDescriptor) -> Self {
        Self {
            from: Some(from.to_string()),
            to: to.map(str::to_string),
            candidate: Some(candidate),
            ..Self::default()
        }
    }
}

/// Guest -> host per-tick input frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputFrame {
    #[serde(rename = "keysPressed")]
    pub keys_pressed: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub click: Option<Click>,
}

impl InputFrame {
    pub fn new(keys: &BTreeSet<Key>, click: Option<Click>) -> Self {
        Self {
            keys_pressed: keys.iter().map(|k| k.code()).collect(),
            click,
        }
    }

    /// Decode the key codes; codes that aren't movement keys are dropped
    pub fn keys(&self) -> BTreeSet<Key> {
        self.keys_pressed
            .iter()
            .filter_map(|c| Key::from_code(*c))
            .collect()
    }
}

/// Data-channel payload, one of the two directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelMsg {
    /// Host -> guest: full board snapshot
    Snapshot(Vec<Entity>),
    /// Guest -> host: local input for this tick
    Input(InputFrame),
}

impl ChannelMsg {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
