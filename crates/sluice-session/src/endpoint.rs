//! The sans-IO transport core.
//!
//! An [`Endpoint`] owns the session registry and the penalty tracker and
//! turns raw datagrams into [`TransportEvent`]s. It never touches a socket
//! or a clock: the caller passes `now` into every operation and writes out
//! whatever [`drain_outgoing`](Endpoint::drain_outgoing) returns.
//!
//! # Inbound pipeline
//!
//! ```text
//! size guard → ban check → kind peek → lookup/create session
//!     → rate limit (by kind) → decode → session dispatch → events
//! ```
//!
//! Every stage that rejects a datagram drops it silently (with a log line).
//! One misbehaving peer never affects another.

use std::mem;
use std::net::{IpAddr, SocketAddr};
use std::sync::Weak;
use std::time::{Duration, Instant};

use sluice_protocol::{
    decode_packet, encode_packet, ClientId, DisconnectInfo, DisconnectReason, Packet, PacketKind,
    Payload,
};

use crate::penalty::{describe_duration, PenaltyTracker, PenaltyVerdict};
use crate::rate_limit::RateDecision;
use crate::session::{Health, Inbound};
use crate::{
    ClientIdentity, DisconnectCause, EndpointConfig, LocalizedText, Room, Session, SessionError,
    SessionRegistry,
};

/// Lifecycle and data notifications for the layer above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The client completed its Hello.
    Identified {
        client_id: ClientId,
        remote: SocketAddr,
        identity: ClientIdentity,
    },
    /// An application payload, already deduplicated (and ordered, if
    /// ordering is on).
    Message {
        client_id: ClientId,
        payload: Payload,
        reliable: bool,
    },
    /// An identified client is gone. Never raised for clients that did not
    /// finish their Hello.
    Disconnected {
        client_id: ClientId,
        remote: SocketAddr,
        cause: DisconnectCause,
    },
}

impl TransportEvent {
    pub fn client_id(&self) -> ClientId {
        match self {
            Self::Identified { client_id, .. }
            | Self::Message { client_id, .. }
            | Self::Disconnected { client_id, .. } => *client_id,
        }
    }
}

pub struct Endpoint {
    config: EndpointConfig,
    registry: SessionRegistry,
    penalties: PenaltyTracker,
    outgoing: Vec<(SocketAddr, Vec<u8>)>,
}

impl Endpoint {
    pub fn new(config: EndpointConfig) -> Self {
        let config = config.validated();
        Self {
            registry: SessionRegistry::new(config.session.clone(), config.rate_limit.clone()),
            penalties: PenaltyTracker::new(config.penalty.clone()),
            outgoing: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn session(&self, client_id: ClientId) -> Option<&Session> {
        self.registry.get_by_client(client_id)
    }

    pub fn session_by_addr(&self, addr: &SocketAddr) -> Option<&Session> {
        self.registry.get(addr)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.registry.iter()
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Datagrams produced since the last call, with their destinations.
    pub fn drain_outgoing(&mut self) -> Vec<(SocketAddr, Vec<u8>)> {
        mem::take(&mut self.outgoing)
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Runs one inbound datagram through the pipeline.
    pub fn handle_datagram(&mut self, from: SocketAddr, datagram: &[u8], now: Instant) -> Vec<TransportEvent> {
        let max = self.config.rate_limit.max_packet_size_bytes;
        if datagram.len() > max {
            tracing::debug!(%from, len = datagram.len(), max, "oversized datagram dropped");
            return Vec::new();
        }

        if let Some(remaining) = self.penalties.ban_remaining(from.ip(), now) {
            if PacketKind::peek(datagram) == Ok(PacketKind::Hello)
                && self.penalties.claim_ban_notice(from.ip(), now)
            {
                self.reject_banned(from, datagram, remaining);
            }
            tracing::trace!(%from, "datagram from banned address dropped");
            return Vec::new();
        }

        let kind = match PacketKind::peek(datagram) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::debug!(%from, error = %e, "undecodable datagram dropped");
                return Vec::new();
            }
        };

        let (session, _) = self.registry.lookup_or_create(from, now);
        let client_id = session.client_id();

        match session.check_rate(kind.class(), now) {
            RateDecision::Accept => {}
            RateDecision::Drop { warnings } => {
                tracing::warn!(%client_id, %from, ?kind, warnings, "rate limit exceeded, datagram dropped");
                return Vec::new();
            }
            RateDecision::Penalize => return self.penalize(from, now),
        }

        let packet = match decode_packet(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!(%client_id, %from, ?kind, error = %e, "malformed packet dropped");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        let mut peer_left = None;
        for inbound in session.handle_packet(packet, now) {
            match inbound {
                Inbound::Identified => {
                    if let Some(identity) = session.identity() {
                        events.push(TransportEvent::Identified {
                            client_id,
                            remote: from,
                            identity: identity.clone(),
                        });
                    }
                }
                Inbound::Deliver { payload, reliable } => events.push(TransportEvent::Message {
                    client_id,
                    payload,
                    reliable,
                }),
                Inbound::PeerDisconnected(info) => peer_left = Some(info),
            }
        }

        self.flush(from);
        if let Some(info) = peer_left {
            events.extend(self.teardown(from, DisconnectCause::Remote(info)));
        }
        events
    }

    /// Answers a Hello from a banned address with the time left on the ban.
    fn reject_banned(&mut self, from: SocketAddr, datagram: &[u8], remaining: Duration) {
        let locale = match decode_packet(datagram) {
            Ok(Packet::Hello { hello, .. }) => hello.language.locale_code(),
            _ => None,
        };
        let remaining = describe_duration(remaining);
        let message = self.config.penalty.ban_message.format(
            locale,
            &self.config.default_locale,
            &[remaining.as_str()],
        );
        let info = DisconnectInfo {
            reason: DisconnectReason::Banned,
            message,
        };
        match encode_packet(&Packet::Disconnect(Some(info))) {
            Ok(bytes) => self.outgoing.push((from, bytes)),
            Err(e) => tracing::error!(%from, error = %e, "failed to encode ban notice"),
        }
    }

    fn penalize(&mut self, addr: SocketAddr, now: Instant) -> Vec<TransportEvent> {
        let ip = addr.ip();
        match self.penalties.record_offense(ip, now) {
            PenaltyVerdict::Disconnect => {
                let info = self.localized_info(
                    &addr,
                    DisconnectReason::Custom,
                    &self.config.penalty.disconnect_message,
                    &[],
                );
                tracing::warn!(%addr, "flood penalty, disconnecting");
                self.close(addr, info, DisconnectCause::RateLimited)
                    .into_iter()
                    .collect()
            }
            PenaltyVerdict::Ban { duration } => self.disconnect_banned(ip, duration),
        }
    }

    // -----------------------------------------------------------------------
    // Outbound / commands
    // -----------------------------------------------------------------------

    /// Sends `payload` to a client. Returns the sequence used if reliable.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] for an unknown client, plus anything
    /// [`Session::send`] rejects.
    pub fn send(
        &mut self,
        client_id: ClientId,
        payload: Payload,
        reliable: bool,
        now: Instant,
    ) -> Result<Option<u16>, SessionError> {
        let addr = self.addr_of(client_id)?;
        let session = self
            .registry
            .get_mut(&addr)
            .ok_or(SessionError::NotFound(client_id))?;
        let sequence = session.send(payload, reliable, now)?;
        self.flush(addr);
        Ok(sequence)
    }

    /// Disconnects a client with an explicit reason and message.
    pub fn disconnect(
        &mut self,
        client_id: ClientId,
        reason: DisconnectReason,
        message: Option<String>,
    ) -> Result<Option<TransportEvent>, SessionError> {
        let addr = self.addr_of(client_id)?;
        Ok(self.close(addr, DisconnectInfo { reason, message }, DisconnectCause::Local))
    }

    /// Disconnects a client with `text` rendered in the client's locale.
    ///
    /// If no template matches, the client is disconnected with reason
    /// `Error` and no message.
    pub fn disconnect_localized(
        &mut self,
        client_id: ClientId,
        reason: DisconnectReason,
        text: &LocalizedText,
        args: &[&str],
    ) -> Result<Option<TransportEvent>, SessionError> {
        let addr = self.addr_of(client_id)?;
        let info = self.localized_info(&addr, reason, text, args);
        Ok(self.close(addr, info, DisconnectCause::Local))
    }

    pub fn attach_room(&mut self, client_id: ClientId, room: Weak<dyn Room>) -> Result<(), SessionError> {
        let session = self
            .registry
            .get_by_client_mut(client_id)
            .ok_or(SessionError::NotFound(client_id))?;
        if !session.is_identified() {
            return Err(SessionError::NotIdentified(client_id));
        }
        session.set_room(room);
        Ok(())
    }

    /// Forgets the client's room without notifying it.
    pub fn detach_room(&mut self, client_id: ClientId) -> Result<(), SessionError> {
        let session = self
            .registry
            .get_by_client_mut(client_id)
            .ok_or(SessionError::NotFound(client_id))?;
        session.clear_room();
        Ok(())
    }

    /// Bans `ip` for `duration` and disconnects every session from it.
    pub fn ban(&mut self, ip: IpAddr, duration: Duration, now: Instant) -> Vec<TransportEvent> {
        self.penalties.ban(ip, duration, now);
        self.disconnect_banned(ip, duration)
    }

    pub fn unban(&mut self, ip: IpAddr) -> bool {
        self.penalties.unban(ip)
    }

    pub fn is_banned(&self, ip: IpAddr, now: Instant) -> bool {
        self.penalties.is_banned(ip, now)
    }

    fn disconnect_banned(&mut self, ip: IpAddr, duration: Duration) -> Vec<TransportEvent> {
        let described = describe_duration(duration);
        let mut events = Vec::new();
        for addr in self.registry.addresses() {
            if addr.ip() != ip {
                continue;
            }
            let info = self.localized_info(
                &addr,
                DisconnectReason::Banned,
                &self.config.penalty.ban_message,
                &[described.as_str()],
            );
            events.extend(self.close(addr, info, DisconnectCause::Banned));
        }
        events
    }

    // -----------------------------------------------------------------------
    // Periodic
    // -----------------------------------------------------------------------

    /// One retransmission sweep over every live session.
    ///
    /// Resends overdue reliable packets, pings identified clients, releases
    /// timed-out reorder gaps, disconnects unresponsive clients and purges
    /// expired bans. Sessions removed during the sweep are skipped.
    pub fn sweep(&mut self, now: Instant) -> Vec<TransportEvent> {
        let mut events = Vec::new();

        for addr in self.registry.addresses() {
            let Some(session) = self.registry.get_mut(&addr) else {
                continue;
            };
            let client_id = session.client_id();
            let maintenance = session.maintain(now);

            events.extend(maintenance.released.into_iter().map(|payload| TransportEvent::Message {
                client_id,
                payload,
                reliable: true,
            }));

            match maintenance.health {
                Health::Alive => self.flush(addr),
                Health::Unresponsive => {
                    tracing::warn!(%client_id, %addr, "client stopped acknowledging, timing out");
                    session.disconnect(Some(DisconnectInfo::new(DisconnectReason::None)));
                    events.extend(self.teardown(addr, DisconnectCause::Timeout));
                }
                Health::Idle => {
                    tracing::debug!(%client_id, %addr, "unidentified session idle, dropping");
                    let _ = self.teardown(addr, DisconnectCause::Timeout);
                }
            }
        }

        self.penalties.purge_expired(now);
        events
    }

    /// Disconnects every session with `ServerRequest` and empties the
    /// registry.
    pub fn shutdown(&mut self) -> Vec<TransportEvent> {
        tracing::info!(sessions = self.registry.len(), "endpoint shutting down");
        let mut events = Vec::new();
        for addr in self.registry.addresses() {
            let info = DisconnectInfo::new(DisconnectReason::ServerRequest);
            events.extend(self.close(addr, info, DisconnectCause::Local));
        }
        events
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn addr_of(&self, client_id: ClientId) -> Result<SocketAddr, SessionError> {
        self.registry
            .address_of(client_id)
            .ok_or(SessionError::NotFound(client_id))
    }

    fn localized_info(
        &self,
        addr: &SocketAddr,
        reason: DisconnectReason,
        text: &LocalizedText,
        args: &[&str],
    ) -> DisconnectInfo {
        let default_locale = &self.config.default_locale;
        let message = match self.registry.get(addr) {
            Some(session) => session.localize(text, default_locale, args),
            None => text.format(None, default_locale, args),
        };
        match message {
            Some(message) => DisconnectInfo::with_message(reason, message),
            None => DisconnectInfo::new(DisconnectReason::Error),
        }
    }

    /// Sends a Disconnect carrying `info`, then tears the session down.
    fn close(
        &mut self,
        addr: SocketAddr,
        info: DisconnectInfo,
        cause: impl FnOnce(DisconnectInfo) -> DisconnectCause,
    ) -> Option<TransportEvent> {
        if let Some(session) = self.registry.get_mut(&addr) {
            session.disconnect(Some(info.clone()));
        }
        self.teardown(addr, cause(info))
    }

    fn flush(&mut self, addr: SocketAddr) {
        if let Some(session) = self.registry.get_mut(&addr) {
            self.outgoing
                .extend(session.take_outgoing().into_iter().map(|bytes| (addr, bytes)));
        }
    }

    /// Removes the session, flushes its last datagrams and notifies its room.
    fn teardown(&mut self, addr: SocketAddr, cause: DisconnectCause) -> Option<TransportEvent> {
        let mut session = self.registry.remove(&addr)?;
        self.outgoing
            .extend(session.take_outgoing().into_iter().map(|bytes| (addr, bytes)));

        let client_id = session.client_id();
        if let Some(room) = session.mark_disconnected().and_then(|room| room.upgrade()) {
            room.detach(client_id, &cause);
        }

        if !session.is_identified() {
            tracing::debug!(%client_id, %addr, %cause, "unidentified session removed");
            return None;
        }
        tracing::info!(%client_id, %addr, %cause, resends = session.total_resends(), "client disconnected");
        Some(TransportEvent::Disconnected {
            client_id,
            remote: addr,
            cause,
        })
    }
}
