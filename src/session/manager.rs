//! Responder-side arena of sessions keyed by remote address.

use std::collections::{HashMap, VecDeque, hash_map::Entry};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use super::{Session, SessionConfig, SessionEvent};
use crate::RaknetError;
use crate::protocol::{
    packet::{OpenConnectionRequest1, Packet},
    reliability::Reliability,
};

/// Owns every responder session of one local endpoint.
///
/// A session is created only by a request-1 from an unknown address and is
/// removed as soon as it closes; its single `Disconnected` event is kept in
/// the table's event queue.
pub struct SessionTable {
    config: Arc<SessionConfig>,
    local_addr: SocketAddr,
    guid: u64,
    sessions: HashMap<SocketAddr, Session>,
    blocked: HashMap<IpAddr, Instant>,
    outgoing: VecDeque<(SocketAddr, Bytes)>,
    events: VecDeque<(SocketAddr, SessionEvent)>,
}

impl SessionTable {
    pub fn new(local_addr: SocketAddr, config: Arc<SessionConfig>) -> Self {
        Self {
            config,
            local_addr,
            guid: rand::random(),
            sessions: HashMap::new(),
            blocked: HashMap::new(),
            outgoing: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn with_guid(mut self, guid: u64) -> Self {
        self.guid = guid;
        self
    }

    pub fn guid(&self) -> u64 {
        self.guid
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &Arc<SessionConfig> {
        &self.config
    }

    pub fn get(&self, peer: &SocketAddr) -> Option<&Session> {
        self.sessions.get(peer)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn is_blocked(&self, ip: IpAddr, now: Instant) -> bool {
        self.blocked.get(&ip).is_some_and(|until| now < *until)
    }

    /// Routes one datagram to its session, creating it on request-1.
    pub fn handle_datagram(
        &mut self,
        peer: SocketAddr,
        bytes: &[u8],
        now: Instant,
    ) -> Result<(), RaknetError> {
        if self.is_blocked(peer.ip(), now) {
            tracing::trace!(peer = %peer, "datagram from blocked address");
            return Ok(());
        }

        let session = match self.sessions.entry(peer) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                if bytes.first() != Some(&OpenConnectionRequest1::ID) {
                    tracing::trace!(peer = %peer, len = bytes.len(), "datagram from unknown peer");
                    return Ok(());
                }
                tracing::debug!(peer = %peer, "create session");
                entry.insert(Session::accept(
                    peer,
                    self.local_addr,
                    self.guid,
                    self.config.clone(),
                    now,
                ))
            }
        };

        let result = session.handle_datagram(bytes, now);
        if let Err(err) = &result {
            tracing::debug!(peer = %peer, error = %err, "datagram rejected");
        }
        self.collect(peer, now);
        result
    }

    pub fn send(
        &mut self,
        peer: SocketAddr,
        payload: Bytes,
        reliability: Reliability,
        channel: u8,
        now: Instant,
    ) -> Result<(), RaknetError> {
        let session = self
            .sessions
            .get_mut(&peer)
            .ok_or(RaknetError::ConnectionClosed)?;
        let result = session.send(payload, reliability, channel, now);
        self.collect(peer, now);
        result
    }

    /// Gracefully closes the session with `peer`, if any.
    pub fn disconnect(&mut self, peer: SocketAddr, now: Instant) -> bool {
        let Some(session) = self.sessions.get_mut(&peer) else {
            return false;
        };
        session.disconnect(now);
        self.collect(peer, now);
        true
    }

    /// Ticks every session and drops expired address blocks.
    pub fn tick(&mut self, now: Instant) {
        let peers: Vec<SocketAddr> = self.sessions.keys().copied().collect();
        for peer in peers {
            if let Some(session) = self.sessions.get_mut(&peer)
                && let Err(err) = session.tick(now)
            {
                tracing::debug!(peer = %peer, error = %err, "tick");
            }
            self.collect(peer, now);
        }
        self.blocked.retain(|_, until| now < *until);
    }

    /// Moves a session's output into the table and reaps it once closed.
    fn collect(&mut self, peer: SocketAddr, now: Instant) {
        let Some(session) = self.sessions.get_mut(&peer) else {
            return;
        };
        self.outgoing
            .extend(session.drain_outgoing().map(|bytes| (peer, bytes)));
        self.events
            .extend(session.drain_events().map(|event| (peer, event)));

        let Some(reason) = session.close_reason() else {
            return;
        };
        self.sessions.remove(&peer);
        if reason.is_abuse()
            && let Some(cooldown) = self.config.abuse_block_duration
        {
            tracing::warn!(peer = %peer, %reason, ?cooldown, "blocking address");
            self.blocked.insert(peer.ip(), now + cooldown);
        }
    }

    /// Encoded datagrams and their destinations, oldest first.
    pub fn drain_outgoing(&mut self) -> impl Iterator<Item = (SocketAddr, Bytes)> + '_ {
        self.outgoing.drain(..)
    }

    pub fn poll_event(&mut self) -> Option<(SocketAddr, SessionEvent)> {
        self.events.pop_front()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = (SocketAddr, SessionEvent)> + '_ {
        self.events.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        datagram::Datagram,
        encapsulated_packet::{EncapsulatedPacket, SplitInfo},
        state::DisconnectReason,
        types::Sequence24,
    };

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn pump(client: &mut Session, table: &mut SessionTable, now: Instant) {
        let client_addr = addr("10.0.0.2:40000");
        for _ in 0..32 {
            let to_server: Vec<Bytes> = client.drain_outgoing().collect();
            let to_client: Vec<(SocketAddr, Bytes)> = table.drain_outgoing().collect();
            if to_server.is_empty() && to_client.is_empty() {
                return;
            }
            for bytes in to_server {
                let _ = table.handle_datagram(client_addr, &bytes, now);
            }
            for (peer, bytes) in to_client {
                assert_eq!(peer, client_addr);
                let _ = client.handle_datagram(&bytes, now);
            }
        }
    }

    fn connected_pair(now: Instant) -> (Session, SessionTable) {
        let config = Arc::new(SessionConfig::default());
        let mut table = SessionTable::new(addr("10.0.0.1:19132"), config.clone()).with_guid(7);
        let mut client = Session::connect(
            addr("10.0.0.1:19132"),
            addr("10.0.0.2:40000"),
            config,
            now,
        );
        pump(&mut client, &mut table, now);
        (client, table)
    }

    #[test]
    fn only_request1_creates_sessions() {
        let now = Instant::now();
        let mut table = SessionTable::new(
            addr("10.0.0.1:19132"),
            Arc::new(SessionConfig::default()),
        );
        table
            .handle_datagram(addr("10.0.0.9:1"), &[0x84, 0, 0, 0], now)
            .unwrap();
        assert!(table.is_empty());
        assert_eq!(table.drain_outgoing().count(), 0);
    }

    #[test]
    fn handshake_through_table() {
        let now = Instant::now();
        let (client, mut table) = connected_pair(now);
        assert!(client.is_connected());
        assert_eq!(client.remote_guid(), Some(7));

        let peer = addr("10.0.0.2:40000");
        assert!(table.get(&peer).is_some_and(Session::is_connected));
        let events: Vec<_> = table.drain_events().collect();
        assert_eq!(events, vec![(peer, SessionEvent::Connected)]);
    }

    #[test]
    fn abuse_closes_and_blocks_peer() {
        let now = Instant::now();
        let (_client, mut table) = connected_pair(now);
        let peer = addr("10.0.0.2:40000");
        table.drain_events().for_each(drop);

        let bogus = EncapsulatedPacket {
            split: Some(SplitInfo {
                count: 5000,
                id: 1,
                index: 0,
            }),
            ..EncapsulatedPacket::new(Reliability::Reliable, Bytes::from_static(b"x"))
        };
        let bytes = Datagram::new(Sequence24::new(50), vec![bogus]).to_bytes();
        let err = table.handle_datagram(peer, &bytes, now).unwrap_err();
        assert!(err.is_fatal());

        assert!(table.is_empty());
        assert_eq!(
            table.poll_event(),
            Some((peer, SessionEvent::Disconnected(DisconnectReason::SplitLimitExceeded)))
        );
        assert!(table.is_blocked(peer.ip(), now));

        let config = Arc::new(SessionConfig::default());
        let mut retry = Session::connect(addr("10.0.0.1:19132"), peer, config, now);
        for bytes in retry.drain_outgoing().collect::<Vec<_>>() {
            table.handle_datagram(peer, &bytes, now).unwrap();
        }
        assert!(table.is_empty());

        table.tick(now + std::time::Duration::from_secs(11));
        assert!(!table.is_blocked(peer.ip(), now + std::time::Duration::from_secs(11)));
    }

    #[test]
    fn graceful_disconnect_reaches_client() {
        let now = Instant::now();
        let (mut client, mut table) = connected_pair(now);
        let peer = addr("10.0.0.2:40000");
        table.drain_events().for_each(drop);
        client.drain_events().for_each(drop);

        assert!(table.disconnect(peer, now));
        assert!(table.is_empty());
        assert_eq!(
            table.poll_event(),
            Some((peer, SessionEvent::Disconnected(DisconnectReason::Disconnected)))
        );

        for (_, bytes) in table.drain_outgoing().collect::<Vec<_>>() {
            let _ = client.handle_datagram(&bytes, now);
        }
        assert_eq!(
            client.poll_event(),
            Some(SessionEvent::Disconnected(DisconnectReason::ClosedByRemotePeer))
        );
    }
}
