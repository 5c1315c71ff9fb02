//! One remote peer: handshake state, reliability, ordering and flood control.
//!
//! A `Session` is sans-IO. Inbound packets go in through
//! [`handle_packet`](Session::handle_packet); datagrams it wants to send pile
//! up in an outbox that the owner drains with
//! [`take_outgoing`](Session::take_outgoing). All time comes from the `now`
//! argument, so behaviour is deterministic under test.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use sluice_protocol::{
    encode_packet, ChatMode, ClientId, ClientVersion, DisconnectInfo, DisconnectReason, Hello,
    Language, Packet, Payload, Platform, TrafficClass,
};

use crate::ack::{AckOutcome, AckTracker};
use crate::config::{RateLimitConfig, SessionConfig};
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::reorder::ReorderBuffer;
use crate::{LocalizedText, Room, SessionError};

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle of a session.
///
/// ```text
/// Unidentified ──(Hello)──→ Identified ──(either side)──→ Disconnecting ──→ Disconnected
/// ```
///
/// Only handshake, ping, ack and disconnect packets are processed while
/// `Unidentified`. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unidentified,
    Identified,
    Disconnecting,
    Disconnected,
}

impl SessionState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Unidentified | Self::Identified)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// ClientIdentity
// ---------------------------------------------------------------------------

/// What a client told us about itself in its Hello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub display_name: String,
    pub client_version: ClientVersion,
    pub hazel_version: u8,
    pub language: Language,
    pub chat_mode: ChatMode,
    pub platform: Platform,
    pub platform_name: String,
}

impl From<Hello> for ClientIdentity {
    fn from(hello: Hello) -> Self {
        Self {
            display_name: hello.display_name,
            client_version: hello.client_version,
            hazel_version: hello.hazel_version,
            language: hello.language,
            chat_mode: hello.chat_mode,
            platform: hello.platform,
            platform_name: hello.platform_name,
        }
    }
}

// ---------------------------------------------------------------------------
// DisconnectCause
// ---------------------------------------------------------------------------

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The peer sent a Disconnect.
    Remote(Option<DisconnectInfo>),
    /// The peer stopped acknowledging.
    Timeout,
    /// Disconnected by the flood penalty.
    RateLimited(DisconnectInfo),
    /// The peer's address was banned.
    Banned(DisconnectInfo),
    /// The server asked for it.
    Local(DisconnectInfo),
}

impl DisconnectCause {
    /// The reason code that went out (or came in) on the wire.
    pub fn reason(&self) -> DisconnectReason {
        match self {
            Self::Remote(info) => info
                .as_ref()
                .map_or(DisconnectReason::None, |info| info.reason),
            Self::Timeout => DisconnectReason::None,
            Self::RateLimited(info) | Self::Banned(info) | Self::Local(info) => info.reason,
        }
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(_) => write!(f, "remote ({})", self.reason()),
            Self::Timeout => write!(f, "timeout"),
            Self::RateLimited(_) => write!(f, "rate limited"),
            Self::Banned(_) => write!(f, "banned"),
            Self::Local(info) => write!(f, "local ({})", info.reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Session results
// ---------------------------------------------------------------------------

/// Something the layer above must hear about after an inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Identified,
    Deliver { payload: Payload, reliable: bool },
    PeerDisconnected(Option<DisconnectInfo>),
}

/// Liveness verdict from [`Session::maintain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Alive,
    /// Identified, but acknowledgements stopped. Disconnect with a timeout.
    Unresponsive,
    /// Never identified and silent past the limit. Drop without ceremony.
    Idle,
}

#[derive(Debug)]
pub struct Maintenance {
    pub health: Health,
    /// Payloads released by a reorder timeout.
    pub released: Vec<Payload>,
    pub resent: usize,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    client_id: ClientId,
    remote: SocketAddr,
    state: SessionState,
    identity: Option<ClientIdentity>,
    config: SessionConfig,

    outgoing_sequence: u16,
    acks: AckTracker,
    reorder: ReorderBuffer<Payload>,
    limiter: RateLimiter,

    round_trip: Option<Duration>,
    room: Option<Weak<dyn Room>>,
    outbox: Vec<Vec<u8>>,
    sent_disconnect: bool,

    created_at: Instant,
    last_received_at: Instant,
    total_resends: u64,
}

impl Session {
    pub fn new(
        client_id: ClientId,
        remote: SocketAddr,
        config: &SessionConfig,
        limits: &RateLimitConfig,
        now: Instant,
    ) -> Self {
        Self {
            client_id,
            remote,
            state: SessionState::Unidentified,
            identity: None,
            config: config.clone(),
            outgoing_sequence: 0,
            acks: AckTracker::new(config.pending_capacity, config.received_history),
            reorder: ReorderBuffer::new(0, config.reorder_capacity, config.reorder_timeout()),
            limiter: RateLimiter::new(limits),
            round_trip: None,
            room: None,
            outbox: Vec::new(),
            sent_disconnect: false,
            created_at: now,
            last_received_at: now,
            total_resends: 0,
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_identified(&self) -> bool {
        self.identity.is_some()
    }

    pub fn identity(&self) -> Option<&ClientIdentity> {
        self.identity.as_ref()
    }

    /// Locale derived from the client's language, if it maps to one.
    pub fn locale(&self) -> Option<&'static str> {
        self.identity.as_ref().and_then(|i| i.language.locale_code())
    }

    /// Latest round-trip sample.
    pub fn round_trip(&self) -> Option<Duration> {
        self.round_trip
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_received_at(&self) -> Instant {
        self.last_received_at
    }

    pub fn total_resends(&self) -> u64 {
        self.total_resends
    }

    pub fn unacked_count(&self) -> usize {
        self.acks.unacked_count()
    }

    pub fn acks(&self) -> &AckTracker {
        &self.acks
    }

    /// The room this session is in, if it still exists.
    pub fn room(&self) -> Option<Arc<dyn Room>> {
        self.room.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_room(&mut self, room: Weak<dyn Room>) {
        self.room = Some(room);
    }

    pub fn clear_room(&mut self) -> Option<Weak<dyn Room>> {
        self.room.take()
    }

    // -- inbound ------------------------------------------------------------

    /// Rate-checks one inbound datagram of `class`.
    pub fn check_rate(&mut self, class: TrafficClass, now: Instant) -> RateDecision {
        self.limiter.check(class, now)
    }

    /// Rate-limit warnings currently counted against this peer.
    pub fn warning_count(&self) -> usize {
        self.limiter.warning_count()
    }

    /// Processes one decoded packet from the peer.
    pub fn handle_packet(&mut self, packet: Packet, now: Instant) -> Vec<Inbound> {
        if !self.state.is_open() {
            tracing::trace!(client_id = %self.client_id, kind = ?packet.kind(), "packet for closing session ignored");
            return Vec::new();
        }
        self.last_received_at = now;

        match packet {
            Packet::Hello { sequence, hello } => self.on_hello(sequence, hello),
            Packet::Acknowledge { sequence, .. } => {
                self.on_ack(sequence, now);
                Vec::new()
            }
            Packet::Ping { sequence } => {
                self.queue_ack(sequence);
                Vec::new()
            }
            Packet::Reliable { sequence, payload } => self.on_reliable(sequence, payload, now),
            Packet::Unreliable { payload } => {
                if !self.is_identified() {
                    tracing::debug!(client_id = %self.client_id, "unreliable data before hello dropped");
                    return Vec::new();
                }
                vec![Inbound::Deliver {
                    payload,
                    reliable: false,
                }]
            }
            Packet::Disconnect(info) => {
                // Never answered with a Disconnect of our own.
                self.state = SessionState::Disconnecting;
                vec![Inbound::PeerDisconnected(info)]
            }
        }
    }

    fn on_hello(&mut self, sequence: u16, hello: Hello) -> Vec<Inbound> {
        self.queue_ack(sequence);
        if self.identity.is_some() {
            tracing::trace!(client_id = %self.client_id, sequence, "repeated hello re-acked");
            return Vec::new();
        }
        self.acks.mark_received(sequence);
        self.reorder.set_next_expected(sequence.wrapping_add(1));

        let identity = ClientIdentity::from(hello);
        tracing::info!(
            client_id = %self.client_id,
            addr = %self.remote,
            name = %identity.display_name,
            version = %identity.client_version,
            language = ?identity.language,
            platform = ?identity.platform,
            "client identified"
        );
        self.identity = Some(identity);
        self.state = SessionState::Identified;
        vec![Inbound::Identified]
    }

    fn on_ack(&mut self, sequence: u16, now: Instant) {
        match self.acks.acknowledge(sequence, now) {
            AckOutcome::Acked { rtt_sample } => {
                if let Some(rtt) = rtt_sample {
                    self.round_trip = Some(rtt);
                }
                tracing::trace!(client_id = %self.client_id, sequence, rtt = ?rtt_sample, "ack");
            }
            AckOutcome::Duplicate => {}
            AckOutcome::Unknown => {
                tracing::trace!(client_id = %self.client_id, sequence, "ack for unknown sequence");
            }
        }
    }

    fn on_reliable(&mut self, sequence: u16, payload: Payload, now: Instant) -> Vec<Inbound> {
        if !self.is_identified() {
            tracing::debug!(client_id = %self.client_id, sequence, "reliable data before hello dropped");
            return Vec::new();
        }
        // Always acked, duplicates included, so a peer that lost our ack
        // stops resending.
        self.queue_ack(sequence);

        if !self.acks.mark_received(sequence) {
            tracing::trace!(client_id = %self.client_id, sequence, "duplicate suppressed");
            return Vec::new();
        }

        let ready = if self.config.message_ordering {
            self.reorder.push(sequence, payload, now)
        } else {
            vec![payload]
        };
        ready
            .into_iter()
            .map(|payload| Inbound::Deliver {
                payload,
                reliable: true,
            })
            .collect()
    }

    // -- outbound -----------------------------------------------------------

    /// Queues `payload` for the peer. Returns the sequence number used if
    /// the send is reliable.
    ///
    /// # Errors
    /// [`SessionError::NotIdentified`] before the Hello,
    /// [`SessionError::Closed`] once disconnecting.
    pub fn send(&mut self, payload: Payload, reliable: bool, now: Instant) -> Result<Option<u16>, SessionError> {
        match self.state {
            SessionState::Identified => {}
            SessionState::Unidentified => return Err(SessionError::NotIdentified(self.client_id)),
            SessionState::Disconnecting | SessionState::Disconnected => {
                return Err(SessionError::Closed(self.client_id));
            }
        }

        if !reliable {
            let bytes = encode_packet(&Packet::Unreliable { payload })?;
            self.outbox.push(bytes);
            return Ok(None);
        }

        let sequence = self.next_sequence();
        let bytes = encode_packet(&Packet::Reliable { sequence, payload })?;
        self.track(sequence, bytes, now);
        Ok(Some(sequence))
    }

    /// Sends a tracked keepalive ping.
    pub fn send_ping(&mut self, now: Instant) -> Result<u16, SessionError> {
        let sequence = self.next_sequence();
        let bytes = encode_packet(&Packet::Ping { sequence })?;
        self.track(sequence, bytes, now);
        Ok(sequence)
    }

    /// Next outgoing sequence, skipping any still awaiting an ack.
    fn next_sequence(&mut self) -> u16 {
        loop {
            self.outgoing_sequence = self.outgoing_sequence.wrapping_add(1);
            if !self.acks.is_outstanding(self.outgoing_sequence) {
                return self.outgoing_sequence;
            }
        }
    }

    fn track(&mut self, sequence: u16, bytes: Vec<u8>, now: Instant) {
        self.outbox.push(bytes.clone());
        if let Some(evicted) = self.acks.record_sent(sequence, bytes, now) {
            if !evicted.acked {
                tracing::debug!(
                    client_id = %self.client_id,
                    sequence = evicted.sequence,
                    "unacked packet evicted from pending list"
                );
            }
        }
    }

    fn queue_ack(&mut self, sequence: u16) {
        match encode_packet(&Packet::ack(sequence)) {
            Ok(bytes) => self.outbox.push(bytes),
            Err(e) => tracing::error!(client_id = %self.client_id, error = %e, "failed to encode ack"),
        }
    }

    /// Queues a Disconnect and moves to `Disconnecting`.
    ///
    /// Returns `false` (and sends nothing) if a Disconnect was already sent
    /// or the peer already disconnected.
    pub fn disconnect(&mut self, info: Option<DisconnectInfo>) -> bool {
        if self.sent_disconnect || !self.state.is_open() {
            return false;
        }
        match encode_packet(&Packet::Disconnect(info)) {
            Ok(bytes) => self.outbox.push(bytes),
            Err(e) => {
                tracing::error!(client_id = %self.client_id, error = %e, "failed to encode disconnect");
                self.outbox.push(vec![0x09]);
            }
        }
        self.sent_disconnect = true;
        self.state = SessionState::Disconnecting;
        true
    }

    /// Terminal transition. Returns the room the session was in.
    pub fn mark_disconnected(&mut self) -> Option<Weak<dyn Room>> {
        self.state = SessionState::Disconnected;
        self.room.take()
    }

    /// Datagrams waiting to go to this peer.
    pub fn take_outgoing(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbox)
    }

    /// Formats `text` in the client's locale.
    pub fn localize(&self, text: &LocalizedText, default_locale: &str, args: &[&str]) -> Option<String> {
        text.format(self.locale(), default_locale, args)
    }

    // -- periodic -----------------------------------------------------------

    /// One sweep: resend overdue packets, ping, and judge liveness.
    pub fn maintain(&mut self, now: Instant) -> Maintenance {
        let mut outcome = Maintenance {
            health: Health::Alive,
            released: Vec::new(),
            resent: 0,
        };
        if !self.state.is_open() {
            return outcome;
        }

        if !self.is_identified() {
            if now.saturating_duration_since(self.last_received_at) > self.config.unresponsive_after() {
                outcome.health = Health::Idle;
            }
            return outcome;
        }

        let stalled_since = self
            .acks
            .oldest_unacked_sent_at()
            .map(|sent| now.saturating_duration_since(sent));
        if self.acks.unacked_count() >= self.acks.pending_capacity()
            && stalled_since.is_some_and(|age| age > self.config.unresponsive_after())
        {
            outcome.health = Health::Unresponsive;
            return outcome;
        }

        for (sequence, bytes) in self.acks.take_overdue(now, self.config.retransmit_after()) {
            tracing::trace!(client_id = %self.client_id, sequence, "resending");
            self.outbox.push(bytes);
            outcome.resent += 1;
        }
        self.total_resends += outcome.resent as u64;

        if let Err(e) = self.send_ping(now) {
            tracing::error!(client_id = %self.client_id, error = %e, "failed to send ping");
        }

        if self.config.message_ordering {
            outcome.released = self.reorder.expire(now);
        }
        outcome
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("remote", &self.remote)
            .field("state", &self.state)
            .field("identity", &self.identity)
            .field("round_trip", &self.round_trip)
            .field("unacked", &self.acks.unacked_count())
            .finish_non_exhaustive()
    }
}

/// `C-3 (127.0.0.1:22023) ping=42ms room=ABCDEF`
impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.client_id, self.remote)?;
        match self.round_trip {
            Some(rtt) => write!(f, " ping={}ms", rtt.as_millis())?,
            None => write!(f, " ping=?")?,
        }
        match self.room() {
            Some(room) => write!(f, " room={}", room.name()),
            None => write!(f, " room=none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_protocol::decode_packet;

    fn addr() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn session(now: Instant) -> Session {
        Session::new(
            ClientId(1),
            addr(),
            &SessionConfig::default(),
            &RateLimitConfig::default(),
            now,
        )
    }

    fn hello() -> Packet {
        Packet::Hello {
            sequence: 1,
            hello: Hello::new(ClientVersion::new(2021, 6, 30, 0), "alice"),
        }
    }

    fn decoded(s: &mut Session) -> Vec<Packet> {
        s.take_outgoing()
            .iter()
            .map(|b| decode_packet(b).unwrap())
            .collect()
    }

    #[test]
    fn test_hello_identifies_and_is_acked() {
        let now = Instant::now();
        let mut s = session(now);
        assert_eq!(s.handle_packet(hello(), now), vec![Inbound::Identified]);
        assert_eq!(s.state(), SessionState::Identified);
        assert_eq!(s.identity().unwrap().display_name, "alice");
        assert_eq!(decoded(&mut s), vec![Packet::ack(1)]);
    }

    #[test]
    fn test_repeated_hello_reacked_not_reidentified() {
        let now = Instant::now();
        let mut s = session(now);
        s.handle_packet(hello(), now);
        s.take_outgoing();
        assert!(s.handle_packet(hello(), now).is_empty());
        assert_eq!(decoded(&mut s), vec![Packet::ack(1)]);
    }

    #[test]
    fn test_data_before_hello_is_dropped_without_ack() {
        let now = Instant::now();
        let mut s = session(now);
        let out = s.handle_packet(
            Packet::Reliable {
                sequence: 2,
                payload: Payload::single(1, vec![1]),
            },
            now,
        );
        assert!(out.is_empty());
        assert!(s.take_outgoing().is_empty());
    }

    #[test]
    fn test_ping_is_acked_while_unidentified() {
        let now = Instant::now();
        let mut s = session(now);
        s.handle_packet(Packet::Ping { sequence: 9 }, now);
        assert_eq!(decoded(&mut s), vec![Packet::ack(9)]);
    }

    #[test]
    fn test_send_before_hello_is_rejected() {
        let now = Instant::now();
        let mut s = session(now);
        let err = s.send(Payload::single(1, vec![]), true, now).unwrap_err();
        assert!(matches!(err, SessionError::NotIdentified(ClientId(1))));
    }

    #[test]
    fn test_sequence_skips_outstanding_values() {
        let now = Instant::now();
        let mut s = session(now);
        s.handle_packet(hello(), now);
        s.outgoing_sequence = u16::MAX - 1;
        assert_eq!(s.send(Payload::new(), true, now).unwrap(), Some(u16::MAX));
        // Force the counter back so the next candidate collides.
        s.outgoing_sequence = u16::MAX - 1;
        assert_eq!(s.send(Payload::new(), true, now).unwrap(), Some(0));
    }

    #[test]
    fn test_ack_updates_round_trip() {
        let t0 = Instant::now();
        let mut s = session(t0);
        s.handle_packet(hello(), t0);
        let seq = s.send(Payload::single(1, vec![]), true, t0).unwrap().unwrap();
        s.handle_packet(Packet::ack(seq), t0 + Duration::from_millis(80));
        assert_eq!(s.round_trip(), Some(Duration::from_millis(80)));
        assert_eq!(s.unacked_count(), 0);
    }

    #[test]
    fn test_peer_disconnect_gets_no_reply() {
        let now = Instant::now();
        let mut s = session(now);
        s.handle_packet(hello(), now);
        s.take_outgoing();

        let out = s.handle_packet(Packet::Disconnect(None), now);
        assert_eq!(out, vec![Inbound::PeerDisconnected(None)]);
        assert!(!s.disconnect(Some(DisconnectInfo::new(DisconnectReason::None))));
        assert!(s.take_outgoing().is_empty());
    }

    #[test]
    fn test_disconnect_is_sent_once() {
        let now = Instant::now();
        let mut s = session(now);
        s.handle_packet(hello(), now);
        s.take_outgoing();

        assert!(s.disconnect(Some(DisconnectInfo::new(DisconnectReason::Kicked))));
        assert!(!s.disconnect(None));
        assert_eq!(
            decoded(&mut s),
            vec![Packet::Disconnect(Some(DisconnectInfo::new(DisconnectReason::Kicked)))]
        );
        // A late Disconnect from the peer is ignored entirely.
        assert!(s.handle_packet(Packet::Disconnect(None), now).is_empty());
        assert!(s.take_outgoing().is_empty());
    }

    #[test]
    fn test_maintain_pings_identified_session() {
        let now = Instant::now();
        let mut s = session(now);
        s.handle_packet(hello(), now);
        s.take_outgoing();

        let m = s.maintain(now);
        assert_eq!(m.health, Health::Alive);
        assert!(matches!(decoded(&mut s).as_slice(), [Packet::Ping { .. }]));
        assert_eq!(s.unacked_count(), 1);
    }

    #[test]
    fn test_silent_unidentified_session_goes_idle() {
        let t0 = Instant::now();
        let mut s = session(t0);
        assert_eq!(s.maintain(t0 + Duration::from_secs(8)).health, Health::Alive);
        assert_eq!(s.maintain(t0 + Duration::from_secs(9)).health, Health::Idle);
    }

    #[test]
    fn test_display_format() {
        let now = Instant::now();
        let mut s = session(now);
        s.round_trip = Some(Duration::from_millis(42));
        assert_eq!(s.to_string(), "C-1 (127.0.0.1:5000) ping=42ms room=none");
    }

    #[test]
    fn test_localize_uses_client_language() {
        let now = Instant::now();
        let mut s = session(now);
        let mut hello = Hello::new(ClientVersion::new(2021, 6, 30, 0), "hans");
        hello.language = Language::German;
        s.handle_packet(Packet::Hello { sequence: 1, hello }, now);

        let text = LocalizedText::single("en", "bye %1").with("de", "tschüss %1");
        assert_eq!(s.localize(&text, "en", &["hans"]).as_deref(), Some("tschüss hans"));
    }

    #[test]
    fn test_cause_reason() {
        assert_eq!(DisconnectCause::Timeout.reason(), DisconnectReason::None);
        assert_eq!(DisconnectCause::Remote(None).reason(), DisconnectReason::None);
        assert_eq!(
            DisconnectCause::Banned(DisconnectInfo::new(DisconnectReason::Banned)).reason(),
            DisconnectReason::Banned
        );
    }
}
