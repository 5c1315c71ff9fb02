//! Integration tests for the endpoint: handshake, reliability, ordering,
//! flood control, bans and room detachment, driven with synthetic datagrams
//! and a hand-advanced clock.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use sluice_protocol::{
    decode_packet, encode_packet, ClientId, ClientVersion, DisconnectInfo, DisconnectReason, Hello,
    Language, Packet, Payload,
};
use sluice_session::{
    DisconnectCause, Endpoint, EndpointConfig, LocalizedText, Room, SessionConfig, SessionError,
    TransportEvent,
};

// =========================================================================
// Helpers
// =========================================================================

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 1], port))
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn hello_bytes(sequence: u16, language: Language) -> Vec<u8> {
    let mut hello = Hello::new(ClientVersion::new(2021, 6, 30, 0), "player");
    hello.language = language;
    encode_packet(&Packet::Hello { sequence, hello }).unwrap()
}

fn body(n: u8) -> Payload {
    Payload::single(1, vec![n])
}

fn reliable_bytes(sequence: u16) -> Vec<u8> {
    encode_packet(&Packet::Reliable {
        sequence,
        payload: body(sequence as u8),
    })
    .unwrap()
}

fn endpoint() -> Endpoint {
    Endpoint::new(EndpointConfig::default())
}

fn ordered_endpoint() -> Endpoint {
    Endpoint::new(EndpointConfig {
        session: SessionConfig {
            message_ordering: true,
            ..SessionConfig::default()
        },
        ..EndpointConfig::default()
    })
}

/// Completes a Hello from `from` and discards the ack.
fn identify(endpoint: &mut Endpoint, from: SocketAddr, now: Instant) -> ClientId {
    identify_as(endpoint, from, Language::English, now)
}

fn identify_as(endpoint: &mut Endpoint, from: SocketAddr, language: Language, now: Instant) -> ClientId {
    let events = endpoint.handle_datagram(from, &hello_bytes(1, language), now);
    endpoint.drain_outgoing();
    match events.as_slice() {
        [TransportEvent::Identified { client_id, .. }] => *client_id,
        other => panic!("expected Identified, got {other:?}"),
    }
}

/// Decodes everything the endpoint queued for `to`.
fn sent_to(endpoint: &mut Endpoint, to: SocketAddr) -> Vec<Packet> {
    endpoint
        .drain_outgoing()
        .into_iter()
        .filter(|(dest, _)| *dest == to)
        .map(|(_, bytes)| decode_packet(&bytes).unwrap())
        .collect()
}

fn delivered(events: &[TransportEvent]) -> Vec<Payload> {
    events
        .iter()
        .filter_map(|e| match e {
            TransportEvent::Message { payload, .. } => Some(payload.clone()),
            _ => None,
        })
        .collect()
}

fn disconnect_causes(events: &[TransportEvent]) -> Vec<DisconnectCause> {
    events
        .iter()
        .filter_map(|e| match e {
            TransportEvent::Disconnected { cause, .. } => Some(cause.clone()),
            _ => None,
        })
        .collect()
}

/// Sends reliable packets from `from` until the rate limiter penalizes it.
/// Starts at `now` on a fresh window.
fn flood(endpoint: &mut Endpoint, from: SocketAddr, now: Instant) -> Vec<TransportEvent> {
    let mut events = Vec::new();
    for sequence in 2..40 {
        events.extend(endpoint.handle_datagram(from, &reliable_bytes(sequence), now));
        if endpoint.session_by_addr(&from).is_none() {
            break;
        }
    }
    events
}

#[derive(Default)]
struct RecordingRoom {
    detached: Mutex<Vec<(ClientId, DisconnectCause)>>,
}

impl Room for RecordingRoom {
    fn name(&self) -> String {
        "ABCDEF".to_string()
    }

    fn detach(&self, client_id: ClientId, cause: &DisconnectCause) {
        self.detached.lock().unwrap().push((client_id, cause.clone()));
    }
}

// =========================================================================
// Handshake
// =========================================================================

#[test]
fn test_hello_identifies_and_acks() {
    let mut e = endpoint();
    let now = Instant::now();
    let events = e.handle_datagram(addr(1), &hello_bytes(1, Language::English), now);

    match events.as_slice() {
        [TransportEvent::Identified {
            client_id,
            remote,
            identity,
        }] => {
            assert_eq!(*client_id, ClientId(1));
            assert_eq!(*remote, addr(1));
            assert_eq!(identity.display_name, "player");
        }
        other => panic!("unexpected events {other:?}"),
    }
    assert_eq!(sent_to(&mut e, addr(1)), vec![Packet::ack(1)]);
}

#[test]
fn test_data_before_hello_is_not_delivered() {
    let mut e = endpoint();
    let now = Instant::now();
    assert!(e.handle_datagram(addr(1), &reliable_bytes(2), now).is_empty());
    assert!(e.drain_outgoing().is_empty());

    let unreliable = encode_packet(&Packet::Unreliable { payload: body(1) }).unwrap();
    assert!(e.handle_datagram(addr(1), &unreliable, now).is_empty());
}

#[test]
fn test_malformed_datagram_is_dropped() {
    let mut e = endpoint();
    let now = Instant::now();
    identify(&mut e, addr(1), now);
    // Reliable header with a truncated payload frame.
    let events = e.handle_datagram(addr(1), &[0x01, 0x00, 0x02, 0x05, 0x00], now);
    assert!(events.is_empty());
    assert!(e.drain_outgoing().is_empty());
    assert_eq!(e.session_count(), 1);
}

// =========================================================================
// Reliability
// =========================================================================

#[test]
fn test_duplicate_reliable_dispatched_once_acked_twice() {
    let mut e = endpoint();
    let now = Instant::now();
    identify(&mut e, addr(1), now);

    let first = e.handle_datagram(addr(1), &reliable_bytes(2), now);
    let second = e.handle_datagram(addr(1), &reliable_bytes(2), now);

    assert_eq!(delivered(&first), vec![body(2)]);
    assert!(second.is_empty());
    assert_eq!(sent_to(&mut e, addr(1)), vec![Packet::ack(2), Packet::ack(2)]);
}

#[test]
fn test_outgoing_sequences_strictly_increase() {
    let mut e = endpoint();
    let now = Instant::now();
    let client = identify(&mut e, addr(1), now);

    let sequences: Vec<u16> = (0..5)
        .map(|_| e.send(client, body(0), true, now).unwrap().unwrap())
        .collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    assert_eq!(e.send(client, body(0), false, now).unwrap(), None);
}

#[test]
fn test_retransmit_identical_bytes_after_interval() {
    let mut e = endpoint();
    let t0 = Instant::now();
    let client = identify(&mut e, addr(1), t0);

    e.send(client, body(9), true, t0).unwrap();
    let original = e.drain_outgoing().remove(0).1;

    e.sweep(t0 + ms(1000));
    let early: Vec<Vec<u8>> = e.drain_outgoing().into_iter().map(|(_, b)| b).collect();
    assert!(!early.contains(&original));

    e.sweep(t0 + ms(1500));
    let late: Vec<Vec<u8>> = e.drain_outgoing().into_iter().map(|(_, b)| b).collect();
    assert!(late.contains(&original));
}

#[test]
fn test_acked_packet_is_not_resent() {
    let mut e = endpoint();
    let t0 = Instant::now();
    let client = identify(&mut e, addr(1), t0);

    let seq = e.send(client, body(9), true, t0).unwrap().unwrap();
    let original = e.drain_outgoing().remove(0).1;
    let ack = encode_packet(&Packet::ack(seq)).unwrap();
    e.handle_datagram(addr(1), &ack, t0 + ms(40));

    assert_eq!(e.session(client).unwrap().round_trip(), Some(ms(40)));
    e.sweep(t0 + ms(2000));
    let out: Vec<Vec<u8>> = e.drain_outgoing().into_iter().map(|(_, b)| b).collect();
    assert!(!out.contains(&original));
}

#[test]
fn test_full_unacked_window_times_out() {
    let mut e = endpoint();
    let t0 = Instant::now();
    let client = identify(&mut e, addr(1), t0);
    for _ in 0..8 {
        e.send(client, body(0), true, t0).unwrap();
    }
    e.drain_outgoing();

    let events = e.sweep(t0 + ms(8001));
    assert_eq!(disconnect_causes(&events), vec![DisconnectCause::Timeout]);
    assert!(matches!(
        sent_to(&mut e, addr(1)).as_slice(),
        [Packet::Disconnect(Some(DisconnectInfo {
            reason: DisconnectReason::None,
            ..
        }))]
    ));
    assert_eq!(e.session_count(), 0);
}

#[test]
fn test_few_unacked_packets_do_not_time_out() {
    let mut e = endpoint();
    let t0 = Instant::now();
    let client = identify(&mut e, addr(1), t0);
    for _ in 0..3 {
        e.send(client, body(0), true, t0).unwrap();
    }
    assert!(disconnect_causes(&e.sweep(t0 + ms(9000))).is_empty());
    assert_eq!(e.session_count(), 1);
}

#[test]
fn test_silent_unidentified_session_dropped_without_event() {
    let mut e = endpoint();
    let t0 = Instant::now();
    let ping = encode_packet(&Packet::Ping { sequence: 3 }).unwrap();
    e.handle_datagram(addr(1), &ping, t0);
    assert_eq!(e.session_count(), 1);

    assert!(e.sweep(t0 + ms(9000)).is_empty());
    assert_eq!(e.session_count(), 0);
}

// =========================================================================
// Ordering
// =========================================================================

#[test]
fn test_ordering_delivers_in_sequence() {
    let mut e = ordered_endpoint();
    let now = Instant::now();
    let events = e.handle_datagram(addr(1), &hello_bytes(4, Language::English), now);
    assert_eq!(events.len(), 1);

    let mut out = Vec::new();
    for seq in [6, 7, 5] {
        out.extend(e.handle_datagram(addr(1), &reliable_bytes(seq), now));
    }
    assert_eq!(delivered(&out), vec![body(5), body(6), body(7)]);
}

#[test]
fn test_unordered_delivers_in_arrival_order() {
    let mut e = endpoint();
    let now = Instant::now();
    identify(&mut e, addr(1), now);

    let mut out = Vec::new();
    for seq in [6, 7, 5] {
        out.extend(e.handle_datagram(addr(1), &reliable_bytes(seq), now));
    }
    assert_eq!(delivered(&out), vec![body(6), body(7), body(5)]);
}

#[test]
fn test_reorder_gap_released_by_sweep_after_timeout() {
    let mut e = ordered_endpoint();
    let t0 = Instant::now();
    identify(&mut e, addr(1), t0);

    assert!(e.handle_datagram(addr(1), &reliable_bytes(3), t0).is_empty());
    assert!(delivered(&e.sweep(t0 + ms(4999))).is_empty());
    assert_eq!(delivered(&e.sweep(t0 + ms(5000))), vec![body(3)]);
}

// =========================================================================
// Flood control
// =========================================================================

#[test]
fn test_reliable_window_limits_and_resets() {
    let mut e = endpoint();
    let t0 = Instant::now();
    let client = identify(&mut e, addr(1), t0);
    let warnings = |e: &Endpoint| e.session(client).unwrap().warning_count();

    // Start on a fresh window after the Hello's.
    let t1 = t0 + ms(4001);
    let mut out = Vec::new();
    for seq in 2..22 {
        out.extend(e.handle_datagram(addr(1), &reliable_bytes(seq), t1));
    }
    assert_eq!(delivered(&out).len(), 20);
    assert_eq!(warnings(&e), 0);
    e.drain_outgoing();

    assert!(e.handle_datagram(addr(1), &reliable_bytes(22), t1 + ms(4000)).is_empty());
    assert!(e.drain_outgoing().is_empty(), "rate-limited datagram must not be acked");
    assert_eq!(warnings(&e), 1);

    let later = e.handle_datagram(addr(1), &reliable_bytes(23), t1 + ms(4001));
    assert_eq!(delivered(&later), vec![body(23)]);
    assert_eq!(warnings(&e), 1, "a fresh window adds no warning");
}

#[test]
fn test_three_warnings_penalize_once() {
    let mut e = endpoint();
    let t0 = Instant::now();
    identify(&mut e, addr(1), t0);

    let events = flood(&mut e, addr(1), t0 + ms(4001));
    let causes = disconnect_causes(&events);
    assert_eq!(causes.len(), 1);
    match &causes[0] {
        DisconnectCause::RateLimited(info) => {
            assert_eq!(info.reason, DisconnectReason::Custom);
            assert_eq!(
                info.message.as_deref(),
                Some("You have been disconnected for sending too many packets.")
            );
        }
        other => panic!("unexpected cause {other:?}"),
    }
    assert_eq!(e.session_count(), 0);

    let disconnects = sent_to(&mut e, addr(1))
        .into_iter()
        .filter(|p| matches!(p, Packet::Disconnect(_)))
        .count();
    assert_eq!(disconnects, 1);
}

#[test]
fn test_warnings_outside_window_do_not_penalize() {
    let mut e = endpoint();
    let t0 = Instant::now();
    identify(&mut e, addr(1), t0);

    let t1 = t0 + ms(4001);
    for seq in 2..24 {
        e.handle_datagram(addr(1), &reliable_bytes(seq), t1);
    }
    // Two warnings so far. The next burst is past the warnings window.
    let t2 = t1 + Duration::from_secs(121);
    let mut events = Vec::new();
    for seq in 24..45 {
        events.extend(e.handle_datagram(addr(1), &reliable_bytes(seq), t2));
    }
    assert!(disconnect_causes(&events).is_empty());
    assert_eq!(e.session_count(), 1);
}

#[test]
fn test_oversize_datagram_dropped() {
    let mut e = endpoint();
    let now = Instant::now();
    let client = identify(&mut e, addr(1), now);

    let mut big = reliable_bytes(2);
    big.resize(4097, 0);
    for _ in 0..50 {
        assert!(e.handle_datagram(addr(1), &big, now).is_empty());
    }
    assert!(e.drain_outgoing().is_empty());
    assert_eq!(e.session(client).unwrap().warning_count(), 0);

    assert!(e.handle_datagram(addr(2), &big, now).is_empty());
    assert_eq!(e.session_count(), 1);
}

#[test]
fn test_repeated_floods_escalate_to_ban() {
    let mut e = endpoint();
    let t0 = Instant::now();

    let mut causes = Vec::new();
    for port in 1..=3 {
        identify(&mut e, addr(port), t0);
        causes.extend(disconnect_causes(&flood(&mut e, addr(port), t0 + ms(4001))));
    }
    assert!(matches!(causes[0], DisconnectCause::RateLimited(_)));
    assert!(matches!(causes[1], DisconnectCause::RateLimited(_)));
    assert!(matches!(causes[2], DisconnectCause::Banned(_)));
    assert!(e.is_banned(addr(1).ip(), t0 + ms(4001)));
}

// =========================================================================
// Disconnects and bans
// =========================================================================

#[test]
fn test_peer_disconnect_is_not_answered() {
    let mut e = endpoint();
    let now = Instant::now();
    identify(&mut e, addr(1), now);

    let bye = encode_packet(&Packet::Disconnect(None)).unwrap();
    let events = e.handle_datagram(addr(1), &bye, now);
    assert_eq!(disconnect_causes(&events), vec![DisconnectCause::Remote(None)]);
    assert!(e.drain_outgoing().is_empty());
    assert_eq!(e.session_count(), 0);
}

#[test]
fn test_reply_to_server_disconnect_does_not_loop() {
    let mut e = endpoint();
    let now = Instant::now();
    let client = identify(&mut e, addr(1), now);

    let event = e.disconnect(client, DisconnectReason::Kicked, None).unwrap();
    assert!(matches!(
        event,
        Some(TransportEvent::Disconnected {
            cause: DisconnectCause::Local(_),
            ..
        })
    ));
    assert_eq!(sent_to(&mut e, addr(1)).len(), 1);

    let bye = encode_packet(&Packet::Disconnect(None)).unwrap();
    assert!(e.handle_datagram(addr(1), &bye, now).is_empty());
    assert!(e.drain_outgoing().is_empty());
    assert_eq!(e.session_count(), 0);
}

#[test]
fn test_disconnect_localized_uses_client_language() {
    let mut e = endpoint();
    let now = Instant::now();
    let client = identify_as(&mut e, addr(1), Language::German, now);

    let text = LocalizedText::single("en", "Goodbye %1").with("de", "Tschüss %1");
    e.disconnect_localized(client, DisconnectReason::Custom, &text, &["player"])
        .unwrap();
    assert_eq!(
        sent_to(&mut e, addr(1)),
        vec![Packet::Disconnect(Some(DisconnectInfo::with_message(
            DisconnectReason::Custom,
            "Tschüss player"
        )))]
    );
}

#[test]
fn test_disconnect_localized_without_template_falls_back_to_error() {
    let mut e = endpoint();
    let now = Instant::now();
    let client = identify(&mut e, addr(1), now);

    e.disconnect_localized(client, DisconnectReason::Custom, &LocalizedText::new(), &[])
        .unwrap();
    assert_eq!(
        sent_to(&mut e, addr(1)),
        vec![Packet::Disconnect(Some(DisconnectInfo::new(DisconnectReason::Error)))]
    );
}

#[test]
fn test_ban_disconnects_every_session_from_address() {
    let mut e = endpoint();
    let now = Instant::now();
    identify(&mut e, addr(1), now);
    identify(&mut e, addr(2), now);
    identify(&mut e, SocketAddr::from(([10, 0, 0, 2], 1)), now);

    let ip: IpAddr = addr(1).ip();
    let events = e.ban(ip, Duration::from_secs(3600), now);
    assert_eq!(events.len(), 2);
    for cause in disconnect_causes(&events) {
        match cause {
            DisconnectCause::Banned(info) => {
                assert_eq!(info.reason, DisconnectReason::Banned);
                assert_eq!(info.message.as_deref(), Some("You have been banned for 1 hour."));
            }
            other => panic!("unexpected cause {other:?}"),
        }
    }
    assert_eq!(e.session_count(), 1);
}

#[test]
fn test_banned_hello_gets_ban_notice_and_no_session() {
    let mut e = endpoint();
    let now = Instant::now();
    e.ban(addr(1).ip(), Duration::from_secs(3600), now);

    let events = e.handle_datagram(addr(5), &hello_bytes(1, Language::English), now);
    assert!(events.is_empty());
    assert_eq!(e.session_count(), 0);
    assert_eq!(
        sent_to(&mut e, addr(5)),
        vec![Packet::Disconnect(Some(DisconnectInfo::with_message(
            DisconnectReason::Banned,
            "You have been banned for 1 hour."
        )))]
    );

    // Anything else from a banned address is dropped silently.
    let ping = encode_packet(&Packet::Ping { sequence: 2 }).unwrap();
    assert!(e.handle_datagram(addr(5), &ping, now).is_empty());
    assert!(e.drain_outgoing().is_empty());
}

#[test]
fn test_banned_hello_flood_gets_one_notice_per_interval() {
    let mut e = endpoint();
    let t0 = Instant::now();
    e.ban(addr(1).ip(), Duration::from_secs(3600), t0);

    let hello = hello_bytes(1, Language::English);
    for i in 0..1000 {
        assert!(e.handle_datagram(addr(5), &hello, t0 + ms(i)).is_empty());
    }
    assert_eq!(e.drain_outgoing().len(), 1);

    // Another port on the same host shares the throttle.
    e.handle_datagram(addr(6), &hello, t0 + ms(1000));
    assert!(e.drain_outgoing().is_empty());

    e.handle_datagram(addr(5), &hello, t0 + ms(10_000));
    assert_eq!(sent_to(&mut e, addr(5)).len(), 1);
}

#[test]
fn test_ban_expires_and_unban_lifts() {
    let mut e = endpoint();
    let t0 = Instant::now();
    let ip = addr(1).ip();
    e.ban(ip, Duration::from_secs(10), t0);
    assert!(e.is_banned(ip, t0 + Duration::from_secs(9)));
    e.sweep(t0 + Duration::from_secs(10));
    assert!(!e.is_banned(ip, t0 + Duration::from_secs(10)));

    e.ban(ip, Duration::from_secs(10), t0);
    assert!(e.unban(ip));
    identify(&mut e, addr(1), t0);
}

#[test]
fn test_shutdown_disconnects_everyone() {
    let mut e = endpoint();
    let now = Instant::now();
    identify(&mut e, addr(1), now);
    identify(&mut e, addr(2), now);

    let events = e.shutdown();
    assert_eq!(events.len(), 2);
    for cause in disconnect_causes(&events) {
        assert_eq!(cause.reason(), DisconnectReason::ServerRequest);
    }
    assert_eq!(e.drain_outgoing().len(), 2);
    assert_eq!(e.session_count(), 0);
}

// =========================================================================
// Rooms
// =========================================================================

#[test]
fn test_room_detached_on_disconnect() {
    let mut e = endpoint();
    let now = Instant::now();
    let client = identify(&mut e, addr(1), now);

    let room = Arc::new(RecordingRoom::default());
    let weak: Weak<dyn Room> = Arc::downgrade(&room) as Weak<dyn Room>;
    e.attach_room(client, weak).unwrap();
    assert_eq!(e.session(client).unwrap().room().unwrap().name(), "ABCDEF");

    let bye = encode_packet(&Packet::Disconnect(None)).unwrap();
    e.handle_datagram(addr(1), &bye, now);

    let detached = room.detached.lock().unwrap();
    assert_eq!(detached.as_slice(), &[(client, DisconnectCause::Remote(None))]);
}

#[test]
fn test_dropped_room_is_not_kept_alive() {
    let mut e = endpoint();
    let now = Instant::now();
    let client = identify(&mut e, addr(1), now);

    let room = Arc::new(RecordingRoom::default());
    e.attach_room(client, Arc::downgrade(&room) as Weak<dyn Room>)
        .unwrap();
    drop(room);

    assert!(e.session(client).unwrap().room().is_none());
    let event = e.disconnect(client, DisconnectReason::Kicked, None).unwrap();
    assert!(event.is_some());
}

#[test]
fn test_detach_room_does_not_notify() {
    let mut e = endpoint();
    let now = Instant::now();
    let client = identify(&mut e, addr(1), now);

    let room = Arc::new(RecordingRoom::default());
    e.attach_room(client, Arc::downgrade(&room) as Weak<dyn Room>)
        .unwrap();
    e.detach_room(client).unwrap();
    e.disconnect(client, DisconnectReason::Kicked, None).unwrap();

    assert!(room.detached.lock().unwrap().is_empty());
}

#[test]
fn test_attach_room_requires_identified_session() {
    let mut e = endpoint();
    let now = Instant::now();
    let ping = encode_packet(&Packet::Ping { sequence: 1 }).unwrap();
    e.handle_datagram(addr(1), &ping, now);

    let room = Arc::new(RecordingRoom::default());
    let err = e
        .attach_room(ClientId(1), Arc::downgrade(&room) as Weak<dyn Room>)
        .unwrap_err();
    assert!(matches!(err, SessionError::NotIdentified(ClientId(1))));
}
