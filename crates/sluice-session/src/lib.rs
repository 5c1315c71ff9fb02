//! Reliable sessions over Hazel UDP.
//!
//! This crate holds everything between raw datagrams and the game:
//!
//! 1. **Reliability**: acknowledgement tracking, resends and duplicate
//!    suppression ([`AckTracker`])
//! 2. **Ordering**: optional in-order delivery of reliable payloads
//!    ([`ReorderBuffer`])
//! 3. **Flood control**: per-session sliding windows ([`RateLimiter`]) and
//!    per-address penalties and bans ([`PenaltyTracker`])
//! 4. **Sessions**: the handshake and lifecycle of one peer ([`Session`]),
//!    all of them keyed by address ([`SessionRegistry`])
//!
//! [`Endpoint`] ties these together. It is sans-IO: feed it datagrams and
//! sweep ticks, drain what it wants sent.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)       ← owns the socket and the clock, drives the endpoint
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Protocol (below)     ← packet codec, ClientId, DisconnectReason
//! ```

mod ack;
mod config;
mod endpoint;
mod error;
mod locale;
mod penalty;
mod rate_limit;
mod registry;
mod reorder;
mod room;
pub mod sequence;
mod session;

pub use ack::{AckOutcome, AckTracker, PendingPacket};
pub use config::{
    EndpointConfig, PenaltyAction, PenaltyPolicy, RateLimitConfig, SessionConfig, WindowLimit,
};
pub use endpoint::{Endpoint, TransportEvent};
pub use error::SessionError;
pub use locale::LocalizedText;
pub use penalty::{describe_duration, PenaltyTracker, PenaltyVerdict};
pub use rate_limit::{RateDecision, RateLimiter, SlidingWindow};
pub use registry::SessionRegistry;
pub use reorder::ReorderBuffer;
pub use room::Room;
pub use session::{
    ClientIdentity, DisconnectCause, Health, Inbound, Maintenance, Session, SessionState,
};
