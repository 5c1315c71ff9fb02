//! Transport abstraction layer for Sluice.
//!
//! Provides the [`DatagramSocket`] trait: an unconnected socket that sends
//! and receives whole datagrams to and from any peer. Reliability, ordering
//! and flood control live in the session layer above; this crate only moves
//! bytes.
//!
//! # Feature Flags
//!
//! - `udp` (default): UDP transport via `tokio::net::UdpSocket`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "udp")]
mod udp;

pub use error::TransportError;
#[cfg(feature = "udp")]
pub use udp::UdpTransport;

use std::net::SocketAddr;

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// A socket that exchanges datagrams with many peers.
pub trait DatagramSocket: Send + Sync + 'static {
    /// The error type for socket operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one datagram to `target`. Returns the number of bytes written.
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<usize, Self::Error>;

    /// Waits for the next datagram from any peer.
    ///
    /// Returns the number of bytes written into `buf` and the sender.
    /// Datagrams longer than `buf` are truncated by the OS.
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), Self::Error>;

    /// Returns the address the socket is bound to.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}
