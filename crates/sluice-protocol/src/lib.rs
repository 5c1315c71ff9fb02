//! Wire protocol for Sluice.
//!
//! This crate speaks the Hazel datagram framing used by the game client:
//!
//! - **Codec** ([`decode_packet`], [`encode_packet`], [`Packet`],
//!   [`PacketKind`]): kind tag, sequence number and body of a datagram.
//! - **Payloads** ([`Payload`], [`RootMessage`]): the opaque,
//!   length-prefixed application messages carried by data packets.
//! - **Types** ([`ClientId`], [`DisconnectReason`], [`Language`], ...):
//!   identity and reason values that appear inside packets.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (datagrams) → Protocol (Packet) → Session (ack, order, rate)
//! ```
//!
//! The protocol layer is pure: no sockets, no clocks, no session state.

mod codec;
mod cursor;
mod error;
mod message;
mod types;

pub use codec::{
    decode_packet, encode_packet, DisconnectInfo, Hello, Packet, PacketKind, TrafficClass,
};
pub use cursor::{ByteReader, ByteWriter};
pub use error::ProtocolError;
pub use message::{Payload, RootMessage};
pub use types::{ChatMode, ClientId, ClientVersion, DisconnectReason, Language, Platform};
