//! The seam between sessions and whatever game room they sit in.

use sluice_protocol::ClientId;

use crate::DisconnectCause;

/// A game room a session can belong to.
///
/// Sessions hold rooms weakly (`Weak<dyn Room>`): the room's owner decides
/// when it goes away, and a session never keeps one alive. When a session is
/// torn down while attached, the endpoint calls [`detach`](Room::detach) so
/// the room can release the seat.
pub trait Room: Send + Sync {
    /// Short label for logs (a game code, for instance).
    fn name(&self) -> String;

    /// The client is gone. Called at most once per attachment, from inside
    /// the endpoint, so it must not block.
    fn detach(&self, client_id: ClientId, cause: &DisconnectCause);
}
