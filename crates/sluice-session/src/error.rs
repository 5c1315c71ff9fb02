//! Error types for the session layer.

use sluice_protocol::{ClientId, ProtocolError};

/// Errors returned by session and endpoint operations.
///
/// Inbound problems (bad datagrams, floods, unknown acks) never surface as
/// errors; they are dropped and logged. These variants only describe calls
/// made by the layer above that cannot be carried out.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No live session has this client id. It either never existed or was
    /// already torn down.
    #[error("no session for client {0}")]
    NotFound(ClientId),

    /// The client has not completed its Hello yet, so nothing may be sent
    /// to it.
    #[error("client {0} has not identified")]
    NotIdentified(ClientId),

    /// The session is disconnecting and accepts no more traffic.
    #[error("session for client {0} is closed")]
    Closed(ClientId),

    /// The outgoing packet could not be encoded.
    #[error("failed to encode packet: {0}")]
    Encode(#[from] ProtocolError),
}
