//! UDP transport implementation using `tokio::net::UdpSocket`.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::{DatagramSocket, TransportError, MAX_DATAGRAM_SIZE};

/// A [`DatagramSocket`] backed by one bound UDP socket.
///
/// All peers share the socket; the session layer tells them apart by
/// their remote address.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds a new UDP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        let local = socket.local_addr().map_err(TransportError::BindFailed)?;
        tracing::info!(%local, "UDP transport listening");
        Ok(Self { socket })
    }

    /// Wraps an already-bound socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self { socket }
    }
}

impl DatagramSocket for UdpTransport {
    type Error = TransportError;

    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<usize, Self::Error> {
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::DatagramTooLarge(data.len()));
        }
        let sent = self
            .socket
            .send_to(data, target)
            .await
            .map_err(TransportError::SendFailed)?;
        tracing::trace!(%target, bytes = sent, "datagram sent");
        Ok(sent)
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), Self::Error> {
        let (len, from) = self
            .socket
            .recv_from(buf)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        tracing::trace!(%from, bytes = len, "datagram received");
        Ok((len, from))
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.socket.local_addr().map_err(TransportError::BindFailed)
    }
}
