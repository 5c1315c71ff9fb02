//! The application side of the server: event handling and commands.
//!
//! The server loop hands every [`TransportEvent`] to a [`SessionHandler`]
//! and waits for it before reading the next datagram, so events for one
//! client arrive in order. Handlers talk back through a [`ServerHandle`],
//! which queues commands for the loop instead of touching sessions
//! directly.

use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Weak;
use std::time::Duration;

use sluice_protocol::{ClientId, DisconnectReason, Payload};
use sluice_session::{LocalizedText, Room, TransportEvent};
use tokio::sync::mpsc;

use crate::SluiceError;

/// Receives session events from the server loop.
///
/// The returned future must be `Send` so the server can run on a spawned
/// task. The loop awaits it before processing anything else, so long work
/// belongs on a task of its own.
pub trait SessionHandler: Send + 'static {
    fn handle(&mut self, event: TransportEvent, server: &ServerHandle) -> impl Future<Output = ()> + Send;
}

/// A handler that forwards every event into a channel.
///
/// Handy when the application wants to consume events from its own task.
pub struct ChannelHandler {
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }
}

impl SessionHandler for ChannelHandler {
    async fn handle(&mut self, event: TransportEvent, _server: &ServerHandle) {
        if self.events.send(event).is_err() {
            tracing::trace!("event receiver dropped, event discarded");
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub(crate) enum Command {
    Send {
        client_id: ClientId,
        payload: Payload,
        reliable: bool,
    },
    Disconnect {
        client_id: ClientId,
        reason: DisconnectReason,
        message: Option<String>,
    },
    DisconnectLocalized {
        client_id: ClientId,
        reason: DisconnectReason,
        text: LocalizedText,
        args: Vec<String>,
    },
    AttachRoom {
        client_id: ClientId,
        room: Weak<dyn Room>,
    },
    DetachRoom {
        client_id: ClientId,
    },
    Ban {
        ip: IpAddr,
        duration: Duration,
    },
    Unban {
        ip: IpAddr,
    },
    Shutdown,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send { client_id, reliable, .. } => {
                write!(f, "Send({client_id}, reliable={reliable})")
            }
            Self::Disconnect { client_id, reason, .. }
            | Self::DisconnectLocalized { client_id, reason, .. } => {
                write!(f, "Disconnect({client_id}, {reason})")
            }
            Self::AttachRoom { client_id, .. } => write!(f, "AttachRoom({client_id})"),
            Self::DetachRoom { client_id } => write!(f, "DetachRoom({client_id})"),
            Self::Ban { ip, duration } => write!(f, "Ban({ip}, {}s)", duration.as_secs()),
            Self::Unban { ip } => write!(f, "Unban({ip})"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Cloneable handle for issuing commands to a running server.
///
/// Every method is fire-and-forget: it queues the command and returns. The
/// only error is [`SluiceError::ServerClosed`], once the loop has stopped.
/// Problems applying a command (unknown client, client not identified) are
/// logged by the loop.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ServerHandle {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (Self { commands }, rx)
    }

    fn submit(&self, command: Command) -> Result<(), SluiceError> {
        self.commands.send(command).map_err(|_| SluiceError::ServerClosed)
    }

    /// Sends `payload` to a client.
    pub fn send(&self, client_id: ClientId, payload: Payload, reliable: bool) -> Result<(), SluiceError> {
        self.submit(Command::Send {
            client_id,
            payload,
            reliable,
        })
    }

    pub fn disconnect(
        &self,
        client_id: ClientId,
        reason: DisconnectReason,
        message: Option<String>,
    ) -> Result<(), SluiceError> {
        self.submit(Command::Disconnect {
            client_id,
            reason,
            message,
        })
    }

    /// Disconnects a client with `text` rendered in its own language.
    pub fn disconnect_localized(
        &self,
        client_id: ClientId,
        reason: DisconnectReason,
        text: LocalizedText,
        args: Vec<String>,
    ) -> Result<(), SluiceError> {
        self.submit(Command::DisconnectLocalized {
            client_id,
            reason,
            text,
            args,
        })
    }

    /// Records the client's room. The room is notified through
    /// [`Room::detach`] when the client goes away.
    pub fn attach_room(&self, client_id: ClientId, room: Weak<dyn Room>) -> Result<(), SluiceError> {
        self.submit(Command::AttachRoom { client_id, room })
    }

    pub fn detach_room(&self, client_id: ClientId) -> Result<(), SluiceError> {
        self.submit(Command::DetachRoom { client_id })
    }

    /// Bans an address and disconnects every client behind it.
    pub fn ban(&self, ip: IpAddr, duration: Duration) -> Result<(), SluiceError> {
        self.submit(Command::Ban { ip, duration })
    }

    pub fn unban(&self, ip: IpAddr) -> Result<(), SluiceError> {
        self.submit(Command::Unban { ip })
    }

    /// Disconnects everyone with `ServerRequest` and stops the loop.
    pub fn shutdown(&self) -> Result<(), SluiceError> {
        self.submit(Command::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
