//! `SluiceServer` builder and server loop.
//!
//! This is the entry point for running a Sluice server. It ties the layers
//! together: UDP socket → endpoint (sessions) → application handler.
//!
//! # Loop
//!
//! One task owns the socket, the endpoint and the handler:
//!
//! ```text
//! select! {
//!     datagram       → endpoint.handle_datagram
//!     command        → endpoint.send / disconnect / ban / ...
//!     sweep tick     → endpoint.sweep
//! }
//! → write endpoint.drain_outgoing() to the socket
//! → await handler.handle(event) for each event, in order
//! ```
//!
//! Session state is only ever touched from this task, so it needs no locks.

use std::net::SocketAddr;
use std::time::Duration;

use sluice_session::{Endpoint, EndpointConfig, TransportEvent};
use sluice_tick::SweepScheduler;
use sluice_transport::{DatagramSocket, UdpTransport};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::handler::{Command, ServerHandle, SessionHandler};
use crate::{ServerConfig, SluiceError};

/// Builder for configuring and starting a Sluice server.
///
/// # Example
///
/// ```rust,ignore
/// use sluice::prelude::*;
///
/// let server = SluiceServerBuilder::new()
///     .bind("0.0.0.0:22023")
///     .build(my_handler)
///     .await?;
/// server.run().await
/// ```
pub struct SluiceServerBuilder {
    config: ServerConfig,
}

impl SluiceServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Replaces the whole configuration, bind address included.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the session, flood control and penalty configuration.
    pub fn endpoint_config(mut self, config: EndpointConfig) -> Self {
        self.config.endpoint = config;
        self
    }

    /// Sets the retransmission sweep interval. Zero disables it.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Binds the socket and prepares the server loop.
    pub async fn build<H: SessionHandler>(self, handler: H) -> Result<SluiceServer<H>, SluiceError> {
        let transport = UdpTransport::bind(&self.config.bind).await?;
        let (handle, commands) = ServerHandle::new();

        Ok(SluiceServer {
            transport,
            scheduler: SweepScheduler::new(self.config.sweep_config()),
            recv_buffer: vec![0; self.config.effective_recv_buffer()],
            endpoint: Endpoint::new(self.config.endpoint),
            handler,
            handle,
            commands,
        })
    }
}

impl Default for SluiceServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Sluice server.
///
/// Call [`run()`](Self::run) to start processing datagrams.
pub struct SluiceServer<H: SessionHandler> {
    transport: UdpTransport,
    endpoint: Endpoint,
    scheduler: SweepScheduler,
    handler: H,
    handle: ServerHandle,
    commands: mpsc::UnboundedReceiver<Command>,
    recv_buffer: Vec<u8>,
}

impl<H: SessionHandler> SluiceServer<H> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, SluiceError> {
        Ok(self.transport.local_addr()?)
    }

    /// A handle for issuing commands once the loop is running.
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Runs the server loop until [`ServerHandle::shutdown`] is called.
    pub async fn run(mut self) -> Result<(), SluiceError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Sluice server running");

        loop {
            let mut stopping = false;

            let events = tokio::select! {
                received = self.transport.recv_from(&mut self.recv_buffer) => match received {
                    Ok((len, from)) => {
                        let now = Instant::now().into_std();
                        self.endpoint.handle_datagram(from, &self.recv_buffer[..len], now)
                    }
                    Err(e) => {
                        // ICMP port-unreachable from a vanished peer surfaces
                        // here on some platforms. Not fatal.
                        tracing::debug!(error = %e, "receive failed");
                        Vec::new()
                    }
                },
                Some(command) = self.commands.recv() => {
                    if matches!(command, Command::Shutdown) {
                        stopping = true;
                        self.endpoint.shutdown()
                    } else {
                        self.apply(command)
                    }
                },
                _ = self.scheduler.wait_for_sweep() => {
                    let visited = self.endpoint.session_count();
                    let events = self.endpoint.sweep(Instant::now().into_std());
                    self.scheduler.record_sweep_end(visited);
                    events
                },
            };

            self.flush().await;
            self.dispatch(events).await;

            if stopping {
                break;
            }
        }

        tracing::info!("Sluice server stopped");
        Ok(())
    }

    fn apply(&mut self, command: Command) -> Vec<TransportEvent> {
        tracing::trace!(?command, "applying command");
        let now = Instant::now().into_std();

        let result = match command {
            Command::Send {
                client_id,
                payload,
                reliable,
            } => self
                .endpoint
                .send(client_id, payload, reliable, now)
                .map(|_| None),
            Command::Disconnect {
                client_id,
                reason,
                message,
            } => self.endpoint.disconnect(client_id, reason, message),
            Command::DisconnectLocalized {
                client_id,
                reason,
                text,
                args,
            } => {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                self.endpoint
                    .disconnect_localized(client_id, reason, &text, &args)
            }
            Command::AttachRoom { client_id, room } => {
                self.endpoint.attach_room(client_id, room).map(|()| None)
            }
            Command::DetachRoom { client_id } => {
                self.endpoint.detach_room(client_id).map(|()| None)
            }
            Command::Ban { ip, duration } => return self.endpoint.ban(ip, duration, now),
            Command::Unban { ip } => {
                if self.endpoint.unban(ip) {
                    tracing::info!(%ip, "address unbanned");
                }
                Ok(None)
            }
            Command::Shutdown => return self.endpoint.shutdown(),
        };

        match result {
            Ok(event) => event.into_iter().collect(),
            Err(e) => {
                tracing::debug!(error = %e, "command not applied");
                Vec::new()
            }
        }
    }

    async fn flush(&mut self) {
        for (addr, bytes) in self.endpoint.drain_outgoing() {
            if let Err(e) = self.transport.send_to(&bytes, addr).await {
                tracing::debug!(%addr, error = %e, "send failed");
            }
        }
    }

    async fn dispatch(&mut self, events: Vec<TransportEvent>) {
        for event in events {
            self.handler.handle(event, &self.handle).await;
        }
    }
}
