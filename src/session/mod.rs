//! Sans-IO per-peer session core.
//!
//! A [`Session`] turns application sends into encoded datagrams and inbound
//! datagrams into delivered messages. It never touches a socket: encoded
//! bytes accumulate in an outgoing queue and notifications in an event
//! queue, both drained by the owner (see [`manager::SessionTable`] and the
//! `transport` module).

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::RaknetError;
use crate::protocol::{
    constants::{DUPLICATE_WINDOW, MAXIMUM_ORDERING_CHANNELS},
    state::{DisconnectReason, SessionRole, SessionState},
    types::{RaknetTime, Sequence24},
};

mod config;
mod handshake;
mod inbound;
pub mod manager;
mod ordering;
mod outbound;
mod received;
mod split;
mod tick;

pub use config::SessionConfig;
pub use manager::SessionTable;

use handshake::Probe;
use ordering::OrderingChannels;
use received::ReceivedWindow;
use split::SplitAssembler;

/// Notifications surfaced to whoever owns the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    /// Emitted exactly once, when the session closes for any reason.
    Disconnected(DisconnectReason),
    /// An application payload, id byte included.
    Message(Bytes),
    LatencyUpdated(Duration),
}

/// A sent datagram kept until acknowledged.
#[derive(Debug, Clone)]
pub(crate) struct TrackedDatagram {
    pub(crate) bytes: Bytes,
    pub(crate) sent_at: Instant,
}

pub struct Session {
    config: Arc<SessionConfig>,
    role: SessionRole,
    state: SessionState,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
    guid: u64,
    remote_guid: Option<u64>,
    mtu: u16,
    epoch: Instant,
    probe: Probe,

    send_seq: Sequence24,
    send_message_index: Sequence24,
    send_order_index: [Sequence24; MAXIMUM_ORDERING_CHANNELS as usize],
    send_sequence_index: [Sequence24; MAXIMUM_ORDERING_CHANNELS as usize],
    next_split_id: u16,
    recovery_queue: HashMap<Sequence24, TrackedDatagram>,
    reliable_queue: HashMap<Sequence24, TrackedDatagram>,

    receive_seq: Sequence24,
    received: ReceivedWindow,
    ordering: OrderingChannels,
    splits: SplitAssembler,
    pending_acks: Vec<Sequence24>,
    pending_nacks: Vec<Sequence24>,

    outgoing: VecDeque<Bytes>,
    events: VecDeque<SessionEvent>,
    /// User payloads that overtook the end of the handshake.
    early_messages: VecDeque<Bytes>,

    last_send: Instant,
    last_receive: Instant,
    last_ping: Instant,
    latency: Option<Duration>,
    close_reason: Option<DisconnectReason>,
}

impl Session {
    fn new(
        role: SessionRole,
        remote_addr: SocketAddr,
        local_addr: SocketAddr,
        guid: u64,
        config: Arc<SessionConfig>,
        now: Instant,
    ) -> Self {
        Self {
            role,
            state: SessionState::Disconnected,
            remote_addr,
            local_addr,
            guid,
            remote_guid: None,
            mtu: config.mtu_ceiling(),
            epoch: now,
            probe: Probe::new(now),

            send_seq: Sequence24::ZERO,
            send_message_index: Sequence24::ZERO,
            send_order_index: [Sequence24::ZERO; MAXIMUM_ORDERING_CHANNELS as usize],
            send_sequence_index: [Sequence24::ZERO; MAXIMUM_ORDERING_CHANNELS as usize],
            next_split_id: 0,
            recovery_queue: HashMap::new(),
            reliable_queue: HashMap::new(),

            receive_seq: Sequence24::ZERO,
            received: ReceivedWindow::new(DUPLICATE_WINDOW),
            ordering: OrderingChannels::new(config.max_ordering_buffer),
            splits: SplitAssembler::new(config.max_split_ids, config.max_split_count),
            pending_acks: Vec::new(),
            pending_nacks: Vec::new(),

            outgoing: VecDeque::new(),
            events: VecDeque::new(),
            early_messages: VecDeque::new(),

            last_send: now,
            last_receive: now,
            last_ping: now,
            latency: None,
            close_reason: None,
            config,
        }
    }

    /// Initiator side: starts MTU discovery towards `remote_addr`.
    pub fn connect(
        remote_addr: SocketAddr,
        local_addr: SocketAddr,
        config: Arc<SessionConfig>,
        now: Instant,
    ) -> Self {
        let mut session = Self::new(
            SessionRole::Initiator,
            remote_addr,
            local_addr,
            rand::random(),
            config,
            now,
        );
        session.start_probing(now);
        session
    }

    /// Responder side: created when the first request-1 from a peer arrives.
    pub fn accept(
        remote_addr: SocketAddr,
        local_addr: SocketAddr,
        server_guid: u64,
        config: Arc<SessionConfig>,
        now: Instant,
    ) -> Self {
        Self::new(
            SessionRole::Responder,
            remote_addr,
            local_addr,
            server_guid,
            config,
            now,
        )
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.close_reason.is_some()
    }

    pub fn close_reason(&self) -> Option<DisconnectReason> {
        self.close_reason
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn guid(&self) -> u64 {
        self.guid
    }

    /// Identifier the peer announced during the handshake.
    pub fn remote_guid(&self) -> Option<u64> {
        self.remote_guid
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    pub fn last_send_time(&self) -> Instant {
        self.last_send
    }

    pub fn last_receive_time(&self) -> Instant {
        self.last_receive
    }

    /// Datagrams sent but not yet acknowledged.
    pub fn unacked_datagrams(&self) -> usize {
        self.recovery_queue.len()
    }

    pub fn pending_reliable_datagrams(&self) -> usize {
        self.reliable_queue.len()
    }

    /// Split messages still being reassembled.
    pub fn pending_splits(&self) -> usize {
        self.splits.len()
    }

    /// Encoded datagrams waiting to be handed to the socket.
    pub fn drain_outgoing(&mut self) -> impl Iterator<Item = Bytes> + '_ {
        self.outgoing.drain(..)
    }

    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = SessionEvent> + '_ {
        self.events.drain(..)
    }

    /// Milliseconds since the session was created, as sent on the wire.
    fn timestamp(&self, now: Instant) -> RaknetTime {
        RaknetTime::from(now.saturating_duration_since(self.epoch))
    }

    /// Moves the state machine forward; backwards or repeated transitions
    /// are ignored.
    fn advance_state(&mut self, to: SessionState) -> bool {
        if self.is_closed() || to <= self.state {
            return false;
        }
        tracing::debug!(peer = %self.remote_addr, from = ?self.state, to = ?to, "session state");
        self.state = to;
        if to == SessionState::Connected {
            tracing::info!(peer = %self.remote_addr, mtu = self.mtu, "session connected");
            self.events.push_back(SessionEvent::Connected);
            self.events
                .extend(self.early_messages.drain(..).map(SessionEvent::Message));
        }
        true
    }

    /// Single exit path: records the reason and fires one disconnect event.
    pub(crate) fn close(&mut self, reason: DisconnectReason) {
        if self.is_closed() {
            return;
        }
        if reason.is_abuse() {
            tracing::warn!(peer = %self.remote_addr, %reason, "session closed");
        } else {
            tracing::info!(peer = %self.remote_addr, %reason, "session closed");
        }
        self.close_reason = Some(reason);
        self.state = SessionState::Disconnected;
        self.recovery_queue.clear();
        self.reliable_queue.clear();
        self.splits.clear();
        self.pending_acks.clear();
        self.pending_nacks.clear();
        self.early_messages.clear();
        self.events.push_back(SessionEvent::Disconnected(reason));
    }

    /// Closes the session for errors that are fatal to it.
    fn fail(&mut self, err: RaknetError) -> RaknetError {
        if err.is_fatal() {
            self.close(err.disconnect_reason().unwrap_or(DisconnectReason::BadPacket));
        }
        err
    }
}
