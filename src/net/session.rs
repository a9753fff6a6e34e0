//! Peer negotiation state machine
//!
//! Sans-IO: the session never touches the peer connection or the relay
//! socket. The platform glue feeds in signaling envelopes, async completions
//! (offer/answer created, channel opened) and a timestamp for the resend
//! timer, then drains [`Command`]s describing what to execute.
//!
//! State flow, offerer side: `Idle -> OfferCreated -> AwaitingAnswer ->
//! Connected`. Answerer side: `Idle -> OfferReceived -> AnswerCreated ->
//! Connected`. `Failed` is reachable from anywhere on an unrecoverable
//! platform error and requires the user to start over.
//!
//! The relay is fire-and-forget, so the offer is re-announced on a fixed
//! interval until the answer is applied. Candidates that arrive before the
//! remote description are buffered FIFO and flushed the moment it is set;
//! applying them earlier would be rejected by the platform.

use std::collections::VecDeque;

use log::{debug, info, warn};
use thiserror::Error;

use super::wire::{CandidateDescriptor, SessionDescription, SignalEnvelope};
use crate::consts::OFFER_RESEND_INTERVAL_MS;

/// Which side of the authority split this peer plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Runs the authoritative pipeline and broadcasts snapshots
    Host,
    /// Sends input frames and mirrors the host's snapshots
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    OfferCreated,
    AwaitingAnswer,
    OfferReceived,
    AnswerCreated,
    Connected,
    Failed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("operation not valid in state {0:?}")]
    InvalidState(SessionState),
    #[error("description could not be applied: {0}")]
    Description(String),
}

/// Instruction for the platform glue, drained from the session outbox
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create the data channel (offerer side, before the offer)
    OpenChannel,
    /// Ask the platform to create an offer; completion arrives via
    /// [`Session::offer_ready`]
    CreateOffer,
    /// Ask the platform to create an answer; completion arrives via
    /// [`Session::answer_ready`]
    CreateAnswer,
    SetLocalDescription(SessionDescription),
    SetRemoteDescription(SessionDescription),
    AddCandidate(CandidateDescriptor),
    /// Send an envelope to the relay
    SignalSend(SignalEnvelope),
}

/// FIFO holding area for candidates that arrive before the remote description
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    queue: VecDeque<CandidateDescriptor>,
}

impl CandidateBuffer {
    pub fn push(&mut self, candidate: CandidateDescriptor) {
        self.queue.push_back(candidate);
    }

    /// Remove and return all buffered candidates in arrival order
    pub fn flush(&mut self) -> Vec<CandidateDescriptor> {
        self.queue.drain(..).collect()
    }

    pub fn contains(&self, candidate: &CandidateDescriptor) -> bool {
        self.queue.contains(candidate)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// One connect attempt's negotiation state
#[derive(Debug)]
pub struct Session {
    local_id: String,
    remote_id: Option<String>,
    role: Option<Role>,
    state: SessionState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    pending: CandidateBuffer,
    applied_candidates: Vec<CandidateDescriptor>,
    next_resend_at: Option<f64>,
    outbox: Vec<Command>,
}

impl Session {
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            remote_id: None,
            role: None,
            state: SessionState::Idle,
            local_description: None,
            remote_description: None,
            pending: CandidateBuffer::default(),
            applied_candidates: Vec::new(),
            next_resend_at: None,
            outbox: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Take everything queued for the platform glue
    pub fn drain_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.outbox)
    }

    /// Announce presence to the room so the other peer learns our id
    pub fn announce(&mut self) {
        self.outbox
            .push(Command::SignalSend(SignalEnvelope::hello(&self.local_id)));
    }

    /// Start negotiating as the offerer. Valid only from `Idle`.
    pub fn open_as_host(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle || self.local_description.is_some() {
            return Err(SessionError::InvalidState(self.state));
        }
        self.role = Some(Role::Host);
        self.outbox.push(Command::OpenChannel);
        self.outbox.push(Command::CreateOffer);
        Ok(())
    }

    /// Wait for an offer as the answerer. Valid only from `Idle`.
    pub fn open_as_guest(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState(self.state));
        }
        self.role = Some(Role::Guest);
        Ok(())
    }

    /// Platform finished creating our offer
    pub fn offer_ready(&mut self, desc: SessionDescription, now_ms: f64) -> Result<(), SessionError> {
        if self.state != SessionState::Idle || self.role != Some(Role::Host) {
            return Err(SessionError::InvalidState(self.state));
        }
        info!("local offer created, announcing to relay");
        self.local_description = Some(desc.clone());
        self.outbox.push(Command::SetLocalDescription(desc.clone()));
        self.outbox.push(Command::SignalSend(SignalEnvelope::offer(
            &self.local_id,
            self.remote_id.as_deref(),
            desc,
        )));
        self.state = SessionState::OfferCreated;
        self.next_resend_at = Some(now_ms + OFFER_RESEND_INTERVAL_MS);
        Ok(())
    }

    /// Platform finished creating our answer
    pub fn answer_ready(&mut self, desc: SessionDescription) -> Result<(), SessionError> {
        if self.state != SessionState::OfferReceived {
            return Err(SessionError::InvalidState(self.state));
        }
        let Some(to) = self.remote_id.clone() else {
            return Err(SessionError::Description(
                "answer ready but offerer id unknown".to_string(),
            ));
        };
        info!("local answer created, replying to {to}");
        self.local_description = Some(desc.clone());
        self.outbox.push(Command::SetLocalDescription(desc.clone()));
        self.outbox.push(Command::SignalSend(SignalEnvelope::answer(
            &self.local_id,
            &to,
            desc,
        )));
        self.state = SessionState::AnswerCreated;
        Ok(())
    }

    /// The relay is fire-and-forget: while we wait for an answer, re-announce
    /// the stored offer on a fixed interval. Call once per frame.
    pub fn poll_resend(&mut self, now_ms: f64) {
        let due = matches!(
            self.state,
            SessionState::OfferCreated | SessionState::AwaitingAnswer
        ) && self.next_resend_at.is_some_and(|at| now_ms >= at);
        if !due {
            return;
        }
        if let Some(desc) = self.local_description.clone() {
            debug!("re-announcing offer");
            self.outbox.push(Command::SignalSend(SignalEnvelope::offer(
                &self.local_id,
                self.remote_id.as_deref(),
                desc,
            )));
        }
        self.state = SessionState::AwaitingAnswer;
        self.next_resend_at = Some(now_ms + OFFER_RESEND_INTERVAL_MS);
    }

    /// A locally gathered candidate needs to reach the other peer
    pub fn local_candidate(&mut self, candidate: CandidateDescriptor) {
        self.outbox.push(Command::SignalSend(SignalEnvelope::candidate(
            &self.local_id,
            self.remote_id.as_deref(),
            candidate,
        )));
    }

    /// Dispatch one relay envelope. Malformed or misaddressed messages are
    /// dropped as no-ops; this must stay idempotent under relay re-delivery.
    pub fn handle_signal(&mut self, env: &SignalEnvelope, now_ms: f64) {
        // Room broadcasts echo our own traffic back
        if env.from.as_deref() == Some(self.local_id.as_str()) {
            return;
        }
        // Addressed messages are only for us; connected announcements and
        // unaddressed offers are broadcast-style
        if let Some(to) = env.to.as_deref() {
            if to != self.local_id {
                debug!("ignoring envelope addressed to {to}");
                return;
            }
        } else if env.connected.is_none() && env.offer.is_none() && env.candidate.is_none() {
            return;
        }
        if let Some(from) = env.from.as_deref() {
            self.note_remote(from);
        }

        if let Some(peer) = env.connected.as_deref() {
            self.peer_announced(peer);
        }
        if let Some(offer) = &env.offer {
            self.receive_offer(offer.clone());
        }
        if let Some(answer) = &env.answer {
            self.receive_answer(answer.clone(), now_ms);
        }
        if let Some(candidate) = &env.candidate {
            self.receive_candidate(candidate.clone());
        }
    }

    /// Another peer announced presence. If we hold an offer, address it to
    /// them immediately instead of waiting for the resend timer.
    fn peer_announced(&mut self, peer: &str) {
        info!("peer {peer} announced");
        self.note_remote(peer);
        if matches!(
            self.state,
            SessionState::OfferCreated | SessionState::AwaitingAnswer
        ) {
            if let Some(desc) = self.local_description.clone() {
                self.outbox.push(Command::SignalSend(SignalEnvelope::offer(
                    &self.local_id,
                    Some(peer),
                    desc,
                )));
            }
        }
    }

    /// Apply a remote offer and produce an answer
    ///
    /// Glare (both sides offered) is broken deterministically: the
    /// lexicographically smaller peer id keeps its offer and stays host; the
    /// larger one abandons its own offer and answers instead.
    fn receive_offer(&mut self, desc: SessionDescription) {
        if self.remote_description.is_some() {
            // Relay re-delivered the offer we already applied
            debug!("duplicate offer ignored");
            return;
        }
        if self.local_description.is_some() || self.role == Some(Role::Host) {
            let remote = self.remote_id.as_deref().unwrap_or("");
            if self.local_id.as_str() < remote {
                debug!("glare: peer {remote} also offered, keeping ours");
                return;
            }
            warn!("glare: yielding offer role to {remote}");
            self.local_description = None;
            self.next_resend_at = None;
            self.state = SessionState::Idle;
        }
        info!("remote offer received, creating answer");
        self.role = Some(Role::Guest);
        self.set_remote_description(desc);
        self.state = SessionState::OfferReceived;
        self.outbox.push(Command::CreateAnswer);
    }

    /// Apply the remote answer; completes the offerer's side
    fn receive_answer(&mut self, desc: SessionDescription, _now_ms: f64) {
        if !matches!(
            self.state,
            SessionState::OfferCreated | SessionState::AwaitingAnswer
        ) {
            debug!("stale answer ignored in state {:?}", self.state);
            return;
        }
        info!("answer received, negotiation complete");
        self.set_remote_description(desc);
        self.next_resend_at = None;
        self.state = SessionState::Connected;
    }

    /// Apply a candidate, or buffer it until the remote description exists.
    /// A candidate the relay re-delivers is applied only once.
    fn receive_candidate(&mut self, candidate: CandidateDescriptor) {
        if self.pending.contains(&candidate) || self.applied_candidates.contains(&candidate) {
            debug!("duplicate candidate ignored");
            return;
        }
        if self.remote_description.is_none() {
            debug!(
                "buffering candidate until remote description ({} pending)",
                self.pending.len() + 1
            );
            self.pending.push(candidate);
        } else {
            self.applied_candidates.push(candidate.clone());
            self.outbox.push(Command::AddCandidate(candidate));
        }
    }

    fn set_remote_description(&mut self, desc: SessionDescription) {
        self.remote_description = Some(desc.clone());
        self.outbox.push(Command::SetRemoteDescription(desc));
        // Candidates buffered ahead of the description go out now, in
        // arrival order, before any candidate received from here on
        for candidate in self.pending.flush() {
            self.applied_candidates.push(candidate.clone());
            self.outbox.push(Command::AddCandidate(candidate));
        }
    }

    fn note_remote(&mut self, peer: &str) {
        if self.remote_id.is_none() {
            self.remote_id = Some(peer.to_string());
        }
    }

    /// The data channel opened; the answerer side becomes `Connected` here
    pub fn channel_open(&mut self) {
        info!("data channel open");
        if self.state == SessionState::AnswerCreated {
            self.state = SessionState::Connected;
        }
    }

    /// Unrecoverable platform failure (description or answer application).
    /// No retry; the user must restart the connect action from `Idle`.
    pub fn fail(&mut self, reason: &str) {
        log::error!("negotiation failed: {reason}");
        self.state = SessionState::Failed;
        self.next_resend_at = None;
    }
}
