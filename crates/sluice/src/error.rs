//! Unified error type for the Sluice server.

use sluice_protocol::ProtocolError;
use sluice_session::SessionError;
use sluice_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `sluice` meta-crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]` attribute
/// on each variant generates the `From` impls, so `?` converts sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum SluiceError {
    /// A socket error (bind, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A packet could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session command could not be carried out.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The server loop has stopped; commands are no longer accepted.
    #[error("server has shut down")]
    ServerClosed,
}
