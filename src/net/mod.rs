//! Peer networking: signaling wire format and negotiation session
//!
//! The relay is a dumb room broadcaster; every signaling payload is a single
//! JSON envelope with optional fields (`wire`). The negotiation state machine
//! (`session`) is sans-IO: the platform glue feeds signaling events and async
//! completions in, and drains a command outbox telling it what to do against
//! the actual peer connection and relay socket.

pub mod session;
pub mod wire;

pub use session::{CandidateBuffer, Command, Role, Session, SessionError, SessionState};
pub use wire::{
    CandidateDescriptor, ChannelMsg, InputFrame, SessionDescription, SignalEnvelope,
};
