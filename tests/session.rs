use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use raknet_session::protocol::{
    ack::{AckKind, AckRecord},
    constants::{self, DEFAULT_UNCONNECTED_MAGIC},
    datagram::Datagram,
    encapsulated_packet::EncapsulatedPacket,
    packet::{
        ConnectionRequestAccepted, OpenConnectionReply1, OpenConnectionRequest1, RaknetPacket,
    },
    types::{Magic, RaknetTime, Sequence24},
};
use raknet_session::{
    DisconnectReason, RaknetError, Reliability, Session, SessionConfig, SessionEvent, SessionState,
};

fn server_addr() -> SocketAddr {
    "127.0.0.1:19132".parse().unwrap()
}

fn client_addr() -> SocketAddr {
    "127.0.0.1:50000".parse().unwrap()
}

fn new_pair(config: SessionConfig, now: Instant) -> (Session, Session) {
    let config = Arc::new(config);
    let client = Session::connect(server_addr(), client_addr(), config.clone(), now);
    let server = Session::accept(client_addr(), server_addr(), 0xABCD, config, now);
    (client, server)
}

/// Hands every queued datagram of `from` to `to`; returns how many moved.
fn deliver(from: &mut Session, to: &mut Session, now: Instant) -> usize {
    let pending: Vec<Bytes> = from.drain_outgoing().collect();
    for bytes in &pending {
        let _ = to.handle_datagram(bytes, now);
    }
    pending.len()
}

fn pump(a: &mut Session, b: &mut Session, now: Instant) {
    for _ in 0..64 {
        if deliver(a, b, now) + deliver(b, a, now) == 0 {
            return;
        }
    }
    panic!("sessions never went quiet");
}

fn connected(config: SessionConfig, now: Instant) -> (Session, Session) {
    let (mut client, mut server) = new_pair(config, now);
    pump(&mut client, &mut server, now);
    assert!(client.is_connected());
    assert!(server.is_connected());
    client.drain_events().for_each(drop);
    server.drain_events().for_each(drop);
    (client, server)
}

fn messages(session: &mut Session) -> Vec<Bytes> {
    session
        .drain_events()
        .filter_map(|event| match event {
            SessionEvent::Message(payload) => Some(payload),
            _ => None,
        })
        .collect()
}

fn user_payload(tag: u8, len: usize) -> Bytes {
    let mut data = vec![0xFE];
    data.extend((0..len).map(|i| (i as u8).wrapping_add(tag)));
    Bytes::from(data)
}

fn raw_datagram(seq: u32, payload: &'static [u8]) -> Bytes {
    let pkt = EncapsulatedPacket::new(Reliability::Unreliable, Bytes::from_static(payload));
    Datagram::new(Sequence24::new(seq), vec![pkt]).to_bytes()
}

const WRONG_MAGIC: Magic = [0xAA; 16];

fn nacks(outgoing: &[Bytes]) -> Vec<Vec<Sequence24>> {
    outgoing
        .iter()
        .filter(|bytes| bytes[0] == AckKind::Nack.id())
        .map(|bytes| {
            let mut buf = bytes.clone();
            AckRecord::decode_expecting(&mut buf, AckKind::Nack)
                .unwrap()
                .payload
                .expand()
        })
        .collect()
}

#[test]
fn handshake_at_small_mtu_connects_both_sides() {
    let now = Instant::now();
    let config = SessionConfig::default().with_mtu_range(400, 500);
    let (mut client, mut server) = new_pair(config, now);
    assert_eq!(client.state(), SessionState::ConnectingPhase1);

    let probe: Vec<Bytes> = client.drain_outgoing().collect();
    assert_eq!(probe.len(), 1);
    assert_eq!(probe[0][0], 0x05);
    assert_eq!(probe[0].len(), 500 - 28);
    server.handle_datagram(&probe[0], now).unwrap();
    assert_eq!(server.state(), SessionState::ConnectingPhase1);

    pump(&mut client, &mut server, now);

    assert_eq!(client.poll_event(), Some(SessionEvent::Connected));
    assert_eq!(server.poll_event(), Some(SessionEvent::Connected));
    assert_eq!(client.mtu(), 500);
    assert_eq!(server.mtu(), 500);
    assert_eq!(client.remote_guid(), Some(0xABCD));
    assert_eq!(server.remote_guid(), Some(client.guid()));
    assert!(client.latency().is_some());
    // the handshake has been fully acknowledged
    assert_eq!(client.unacked_datagrams(), 0);
    assert_eq!(server.unacked_datagrams(), 0);
}

#[test]
fn gap_produces_single_nack_for_missing_sequence() {
    let now = Instant::now();
    let config = Arc::new(SessionConfig::default());
    let mut server = Session::accept(client_addr(), server_addr(), 1, config, now);

    for seq in [0, 1, 3, 4] {
        server.handle_datagram(&raw_datagram(seq, b"\xFE"), now).unwrap();
    }
    let outgoing: Vec<Bytes> = server.drain_outgoing().collect();
    assert_eq!(nacks(&outgoing), vec![vec![Sequence24::new(2)]]);
    let acks = outgoing
        .iter()
        .filter(|bytes| bytes[0] == AckKind::Ack.id())
        .count();
    assert_eq!(acks, 4);
}

#[test]
fn huge_sequence_jump_is_not_nacked() {
    let now = Instant::now();
    let config = Arc::new(SessionConfig::default());
    let mut server = Session::accept(client_addr(), server_addr(), 1, config, now);

    server.handle_datagram(&raw_datagram(0, b"\xFE"), now).unwrap();
    server.handle_datagram(&raw_datagram(100_000, b"\xFE"), now).unwrap();
    let outgoing: Vec<Bytes> = server.drain_outgoing().collect();
    assert!(nacks(&outgoing).is_empty());
}

#[test]
fn duplicate_datagram_is_acked_but_delivered_once() {
    let now = Instant::now();
    let (mut client, mut server) = connected(SessionConfig::default(), now);

    client
        .send(user_payload(1, 10), Reliability::Reliable, 0, now)
        .unwrap();
    let sent: Vec<Bytes> = client.drain_outgoing().collect();
    assert_eq!(sent.len(), 1);
    server.handle_datagram(&sent[0], now).unwrap();
    server.handle_datagram(&sent[0], now).unwrap();

    assert_eq!(messages(&mut server), vec![user_payload(1, 10)]);
    let acks = server
        .drain_outgoing()
        .filter(|bytes| bytes[0] == AckKind::Ack.id())
        .count();
    assert_eq!(acks, 2);
}

#[test]
fn stale_sequenced_messages_are_dropped() {
    let now = Instant::now();
    let (mut client, mut server) = connected(SessionConfig::default(), now);

    for tag in 0..3 {
        client
            .send(user_payload(tag, 4), Reliability::UnreliableSequenced, 1, now)
            .unwrap();
    }
    let sent: Vec<Bytes> = client.drain_outgoing().collect();
    for i in [0, 2, 1] {
        server.handle_datagram(&sent[i], now).unwrap();
    }
    assert_eq!(
        messages(&mut server),
        vec![user_payload(0, 4), user_payload(2, 4)]
    );
}

#[test]
fn ordered_messages_survive_reordering() {
    let now = Instant::now();
    let (mut client, mut server) = connected(SessionConfig::default(), now);

    for tag in 0..4 {
        client
            .send(user_payload(tag, 8), Reliability::ReliableOrdered, 2, now)
            .unwrap();
    }
    let sent: Vec<Bytes> = client.drain_outgoing().collect();
    server.handle_datagram(&sent[3], now).unwrap();
    server.handle_datagram(&sent[1], now).unwrap();
    assert!(messages(&mut server).is_empty());

    server.handle_datagram(&sent[0], now).unwrap();
    server.handle_datagram(&sent[2], now).unwrap();
    assert_eq!(
        messages(&mut server),
        (0..4).map(|tag| user_payload(tag, 8)).collect::<Vec<_>>()
    );
}

#[test]
fn split_messages_reassemble_across_sizes() {
    let now = Instant::now();
    let (mut client, mut server) = connected(SessionConfig::default(), now);
    let mtu = client.mtu() as usize;

    for len in [0, 1, 100, mtu - 60, mtu, 2 * mtu, 3 * mtu + 17, 7 * mtu] {
        let payload = user_payload(len as u8, len);
        client
            .send(payload.clone(), Reliability::ReliableOrdered, 0, now)
            .unwrap();
        let sent: Vec<Bytes> = client.drain_outgoing().collect();
        assert!(sent.iter().all(|bytes| bytes.len() <= mtu - 28));
        if len >= mtu {
            assert!(sent.len() > 1, "len {len} should split");
        }
        // deliver fragments back to front
        for bytes in sent.iter().rev() {
            server.handle_datagram(bytes, now).unwrap();
        }
        assert_eq!(messages(&mut server), vec![payload], "len {len}");
        assert_eq!(server.pending_splits(), 0);
        pump(&mut client, &mut server, now);
    }
    assert_eq!(client.unacked_datagrams(), 0);
}

#[test]
fn nack_triggers_resend_with_same_sequence() {
    let now = Instant::now();
    let (mut client, mut server) = connected(SessionConfig::default(), now);

    client
        .send(user_payload(1, 16), Reliability::Reliable, 0, now)
        .unwrap();
    let lost: Vec<Bytes> = client.drain_outgoing().collect();
    client
        .send(user_payload(2, 16), Reliability::Reliable, 0, now)
        .unwrap();
    deliver(&mut client, &mut server, now);
    assert_eq!(messages(&mut server), vec![user_payload(2, 16)]);

    deliver(&mut server, &mut client, now);
    let resent: Vec<Bytes> = client.drain_outgoing().collect();
    assert_eq!(resent, lost);

    for bytes in &resent {
        server.handle_datagram(bytes, now).unwrap();
    }
    assert_eq!(messages(&mut server), vec![user_payload(1, 16)]);
    pump(&mut client, &mut server, now);
    assert_eq!(client.unacked_datagrams(), 0);
}

#[test]
fn unacked_reliable_datagrams_are_resent_on_tick() {
    let now = Instant::now();
    let (mut client, _server) = connected(SessionConfig::default(), now);

    client
        .send(user_payload(1, 16), Reliability::Reliable, 0, now)
        .unwrap();
    client
        .send(user_payload(2, 16), Reliability::Unreliable, 0, now)
        .unwrap();
    let first: Vec<Bytes> = client.drain_outgoing().collect();
    assert_eq!(client.unacked_datagrams(), 2);

    client.tick(now + Duration::from_millis(1500)).unwrap();
    let resent: Vec<Bytes> = client.drain_outgoing().collect();
    assert_eq!(resent, vec![first[0].clone()]);
    // the unreliable datagram is forgotten, never resent
    assert_eq!(client.unacked_datagrams(), 1);
    assert_eq!(client.pending_reliable_datagrams(), 1);
}

#[test]
fn mtu_discovery_fails_below_floor() {
    let now = Instant::now();
    let config = Arc::new(SessionConfig::default());
    let mut client = Session::connect(server_addr(), client_addr(), config, now);

    let mut sizes: Vec<usize> = client.drain_outgoing().map(|b| b.len()).collect();
    let mut failure = None;
    for second in 1..30 {
        match client.tick(now + Duration::from_secs(second)) {
            Ok(()) => sizes.extend(client.drain_outgoing().map(|b| b.len())),
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    assert!(matches!(
        failure,
        Some(RaknetError::MtuDiscoveryFailed { floor: 576 })
    ));
    assert_eq!(sizes, vec![1372, 1372, 1372, 1172, 1172, 1172, 548, 548, 548]);
    assert_eq!(client.close_reason(), Some(DisconnectReason::MtuNegotiationFailed));
    assert_eq!(
        client.drain_events().last(),
        Some(SessionEvent::Disconnected(DisconnectReason::MtuNegotiationFailed))
    );
}

#[test]
fn responder_answers_smaller_probe() {
    let now = Instant::now();
    let server_config = SessionConfig::default().with_mtu_range(576, 1200);
    let mut client = Session::connect(
        server_addr(),
        client_addr(),
        Arc::new(SessionConfig::default()),
        now,
    );
    let mut server = Session::accept(client_addr(), server_addr(), 1, Arc::new(server_config), now);
    pump(&mut client, &mut server, now);
    assert!(client.is_connected());
    assert_eq!(client.mtu(), 1200);
    assert_eq!(server.mtu(), 1200);
}

#[test]
fn incompatible_protocol_closes_both_sides() {
    let now = Instant::now();
    let mut client = Session::connect(
        server_addr(),
        client_addr(),
        Arc::new(SessionConfig::default().with_protocol_version(10)),
        now,
    );
    let mut server = Session::accept(
        client_addr(),
        server_addr(),
        1,
        Arc::new(SessionConfig::default()),
        now,
    );

    deliver(&mut client, &mut server, now);
    assert_eq!(
        server.close_reason(),
        Some(DisconnectReason::IncompatibleProtocolVersion)
    );
    let reply: Vec<Bytes> = server.drain_outgoing().collect();
    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0][0], 0x19);

    let err = client.handle_datagram(&reply[0], now).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(
        client.close_reason(),
        Some(DisconnectReason::IncompatibleProtocolVersion)
    );
}

#[test]
fn idle_session_times_out_once() {
    let now = Instant::now();
    let (_client, mut server) = connected(SessionConfig::default(), now);

    let err = server.tick(now + Duration::from_secs(11)).unwrap_err();
    assert!(matches!(err, RaknetError::Disconnected(DisconnectReason::TimedOut)));
    assert!(server.is_closed());
    assert_eq!(
        server.drain_events().collect::<Vec<_>>(),
        vec![SessionEvent::Disconnected(DisconnectReason::TimedOut)]
    );
    // closed sessions stay quiet
    server.tick(now + Duration::from_secs(30)).unwrap();
    assert!(server.poll_event().is_none());
}

#[test]
fn keepalive_ping_updates_latency() {
    let now = Instant::now();
    let (mut client, mut server) = connected(SessionConfig::default(), now);

    let later = now + Duration::from_secs(5);
    client.tick(later).unwrap();
    pump(&mut client, &mut server, later + Duration::from_millis(40));

    let latencies: Vec<Duration> = client
        .drain_events()
        .filter_map(|event| match event {
            SessionEvent::LatencyUpdated(latency) => Some(latency),
            _ => None,
        })
        .collect();
    assert_eq!(latencies, vec![Duration::from_millis(40)]);
    assert_eq!(client.latency(), Some(Duration::from_millis(40)));
}

#[test]
fn sends_are_rejected_until_connected() {
    let now = Instant::now();
    let (mut client, _server) = new_pair(SessionConfig::default(), now);
    assert!(matches!(
        client.send(user_payload(0, 1), Reliability::Reliable, 0, now),
        Err(RaknetError::NotConnected)
    ));

    let (mut client, _server) = connected(SessionConfig::default(), now);
    assert!(matches!(
        client.send(user_payload(0, 1), Reliability::ReliableOrdered, 32, now),
        Err(RaknetError::InvalidChannel(32))
    ));
    assert!(client.is_connected());
}

#[test]
fn malformed_datagram_is_dropped_without_closing() {
    let now = Instant::now();
    let (_client, mut server) = connected(SessionConfig::default(), now);

    // valid header, then a packet with reliability code 7 and a truncated body
    let err = server.handle_datagram(&[0x84, 9, 0, 0, 0xE0, 0x00], now).unwrap_err();
    assert!(!err.is_fatal());
    assert!(server.is_connected());
}

#[test]
fn disconnect_notifies_peer() {
    let now = Instant::now();
    let (mut client, mut server) = connected(SessionConfig::default(), now);

    client.disconnect(now);
    assert_eq!(
        client.poll_event(),
        Some(SessionEvent::Disconnected(DisconnectReason::Disconnected))
    );
    deliver(&mut client, &mut server, now);
    assert_eq!(
        server.poll_event(),
        Some(SessionEvent::Disconnected(DisconnectReason::ClosedByRemotePeer))
    );
    assert!(matches!(
        server.handle_datagram(&raw_datagram(40, b"\xFE"), now),
        Err(RaknetError::ConnectionClosed)
    ));
}

#[test]
fn unconnected_ids_inside_datagrams_are_user_data() {
    let now = Instant::now();
    let (mut client, mut server) = connected(SessionConfig::default(), now);

    let sent: Vec<Bytes> = [0x05u8, 0x06, 0x07, 0x08, 0x19]
        .into_iter()
        .map(|id| Bytes::from(vec![id, 1, 2, 3]))
        .collect();
    for payload in &sent {
        client
            .send(payload.clone(), Reliability::ReliableOrdered, 0, now)
            .unwrap();
    }
    pump(&mut client, &mut server, now);

    assert_eq!(messages(&mut server), sent);
    assert!(server.is_connected());
    assert_eq!(client.unacked_datagrams(), 0);
}

#[test]
fn user_data_overtaking_client_handshake_is_kept() {
    let now = Instant::now();
    let (mut client, mut server) = new_pair(SessionConfig::default(), now);

    // request 1/2 and their replies, then connect request and its answer
    for _ in 0..3 {
        deliver(&mut client, &mut server, now);
        deliver(&mut server, &mut client, now);
    }
    assert!(client.is_connected());
    assert_eq!(server.state(), SessionState::Handshaking);
    client.drain_events().for_each(drop);

    let handshake: Vec<Bytes> = client.drain_outgoing().collect();
    client
        .send(Bytes::from_static(b"\xFEdata"), Reliability::Reliable, 0, now)
        .unwrap();
    deliver(&mut client, &mut server, now);
    assert!(server.poll_event().is_none());

    for bytes in &handshake {
        let _ = server.handle_datagram(bytes, now);
    }
    assert_eq!(
        server.drain_events().collect::<Vec<_>>(),
        vec![
            SessionEvent::Connected,
            SessionEvent::Message(Bytes::from_static(b"\xFEdata")),
        ]
    );
    pump(&mut client, &mut server, now);
    assert_eq!(client.unacked_datagrams(), 0);
}

#[test]
fn empty_payload_is_rejected() {
    let now = Instant::now();
    let (mut client, _server) = connected(SessionConfig::default(), now);

    assert!(matches!(
        client.send(Bytes::new(), Reliability::Reliable, 0, now),
        Err(RaknetError::EmptyPayload)
    ));
    assert_eq!(client.drain_outgoing().count(), 0);
    assert_eq!(client.unacked_datagrams(), 0);
    assert!(client.is_connected());
}

#[test]
fn request1_with_wrong_magic_is_ignored() {
    let now = Instant::now();
    let mut server = Session::accept(
        client_addr(),
        server_addr(),
        1,
        Arc::new(SessionConfig::default()),
        now,
    );

    let probe = RaknetPacket::from(OpenConnectionRequest1::for_mtu(
        WRONG_MAGIC,
        constants::RAKNET_PROTOCOL_VERSION,
        1400,
    ))
    .to_bytes();
    server.handle_datagram(&probe, now).unwrap();

    assert_eq!(server.state(), SessionState::Disconnected);
    assert!(!server.is_closed());
    assert_eq!(server.drain_outgoing().count(), 0);
}

#[test]
fn reply1_with_wrong_magic_is_ignored() {
    let now = Instant::now();
    let mut client = Session::connect(
        server_addr(),
        client_addr(),
        Arc::new(SessionConfig::default()),
        now,
    );
    client.drain_outgoing().for_each(drop);

    let reply = RaknetPacket::from(OpenConnectionReply1 {
        magic: WRONG_MAGIC,
        server_guid: 7,
        cookie: None,
        mtu: 1400,
    })
    .to_bytes();
    client.handle_datagram(&reply, now).unwrap();

    assert_eq!(client.state(), SessionState::ConnectingPhase1);
    assert_eq!(client.remote_guid(), None);
    assert_eq!(client.drain_outgoing().count(), 0);

    // the genuine reply still moves the handshake on
    let reply = RaknetPacket::from(OpenConnectionReply1 {
        magic: DEFAULT_UNCONNECTED_MAGIC,
        server_guid: 7,
        cookie: None,
        mtu: 1400,
    })
    .to_bytes();
    client.handle_datagram(&reply, now).unwrap();
    assert_eq!(client.state(), SessionState::ConnectingPhase2);
}

#[test]
fn server_handshake_with_wrong_timestamp_is_ignored() {
    let now = Instant::now();
    let (mut client, mut server) = new_pair(SessionConfig::default(), now);
    for _ in 0..2 {
        deliver(&mut client, &mut server, now);
        deliver(&mut server, &mut client, now);
    }
    assert_eq!(client.state(), SessionState::Handshaking);
    client.drain_outgoing().for_each(drop);

    let accepted = RaknetPacket::from(ConnectionRequestAccepted {
        client_addr: client_addr(),
        system_index: 0,
        system_addresses: constants::SYSTEM_ADDRESSES,
        request_timestamp: RaknetTime(12_345),
        accepted_timestamp: RaknetTime(0),
    })
    .to_bytes();
    let pkt = EncapsulatedPacket::new(Reliability::Unreliable, accepted);
    let datagram = Datagram::new(Sequence24::new(0), vec![pkt]).to_bytes();
    client.handle_datagram(&datagram, now).unwrap();

    assert_eq!(client.state(), SessionState::Handshaking);
    assert!(client.poll_event().is_none());
    // only the acknowledgement goes out
    let outgoing: Vec<Bytes> = client.drain_outgoing().collect();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0][0], AckKind::Ack.id());
}
