//! # Sluice
//!
//! Reliable, ordered, flood-resistant sessions over Hazel UDP.
//!
//! Sluice sits between a UDP socket and a game server. It performs the
//! client handshake, acknowledges and retransmits reliable packets,
//! suppresses duplicates, optionally restores ordering, rate-limits each
//! peer and bans the ones that keep flooding. The game only sees
//! [`TransportEvent`](sluice_session::TransportEvent)s and sends payloads
//! back through a [`ServerHandle`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sluice::prelude::*;
//!
//! // Implement SessionHandler for your game, then:
//! // let server = SluiceServerBuilder::new()
//! //     .bind("0.0.0.0:22023")
//! //     .build(my_handler)
//! //     .await?;
//! // server.run().await
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::SluiceError;
pub use handler::{ChannelHandler, ServerHandle, SessionHandler};
pub use server::{SluiceServer, SluiceServerBuilder};

pub use sluice_protocol as protocol;
pub use sluice_session as session;
pub use sluice_tick as tick;
pub use sluice_transport as transport;

pub mod prelude {
    pub use crate::{
        ChannelHandler, ServerConfig, ServerHandle, SessionHandler, SluiceError, SluiceServer,
        SluiceServerBuilder,
    };
    pub use sluice_protocol::{
        ClientId, ClientVersion, DisconnectInfo, DisconnectReason, Language, Payload, Platform,
        RootMessage,
    };
    pub use sluice_session::{
        ClientIdentity, DisconnectCause, EndpointConfig, LocalizedText, PenaltyAction,
        PenaltyPolicy, RateLimitConfig, Room, SessionConfig, TransportEvent,
    };
}
