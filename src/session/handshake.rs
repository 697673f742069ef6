//! Connection handshake, driven by control packets.
//!
//! Request-1/reply-1 and request-2/reply-2 travel as raw unconnected
//! datagrams; connect-request, server handshake and client handshake travel
//! reliably inside datagrams.

use std::time::{Duration, Instant};

use bytes::Bytes;

use super::{Session, SessionEvent};
use crate::RaknetError;
use crate::protocol::{
    constants,
    cursor::Cursor,
    packet::{
        self, ConnectedPong, ConnectionRequest, ConnectionRequestAccepted,
        DisconnectionNotification, IncompatibleProtocolVersion, NewIncomingConnection,
        OpenConnectionReply1, OpenConnectionReply2, OpenConnectionRequest1,
        OpenConnectionRequest2, RaknetPacket,
    },
    reliability::Reliability,
    state::{DisconnectReason, SessionRole, SessionState},
    types::RaknetTime,
};

/// Initiator-side retry bookkeeping for the unconnected steps.
pub(crate) struct Probe {
    /// Position in the configured MTU probe sizes.
    pub(crate) size_index: usize,
    pub(crate) attempts: usize,
    pub(crate) last_attempt: Instant,
    pub(crate) request_timestamp: Option<RaknetTime>,
}

impl Probe {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            size_index: 0,
            attempts: 0,
            last_attempt: now,
            request_timestamp: None,
        }
    }
}

/// Handshake packets go out reliably on channel 0, ahead of application data.
const HANDSHAKE_RELIABILITY: Reliability = Reliability::ReliableOrdered;

impl Session {
    pub(super) fn start_probing(&mut self, now: Instant) {
        self.advance_state(SessionState::ConnectingPhase1);
        self.probe = Probe::new(now);
        self.send_request1(now);
    }

    /// Sends request-1 at the current candidate MTU.
    pub(super) fn send_request1(&mut self, now: Instant) {
        let sizes = self.config.mtu_probe_sizes();
        let Some(&mtu) = sizes.get(self.probe.size_index) else {
            return;
        };
        self.mtu = mtu;
        tracing::debug!(peer = %self.remote_addr, mtu, attempt = self.probe.attempts, "open connection request 1");
        let pkt = OpenConnectionRequest1::for_mtu(self.config.magic, self.config.protocol_version, mtu);
        self.send_unconnected(pkt.into());
        self.probe.attempts += 1;
        self.probe.last_attempt = now;
    }

    pub(super) fn send_request2(&mut self, now: Instant) {
        let pkt = OpenConnectionRequest2 {
            magic: self.config.magic,
            server_addr: self.remote_addr,
            mtu: self.mtu,
            client_guid: self.guid,
        };
        self.send_unconnected(pkt.into());
        self.probe.attempts += 1;
        self.probe.last_attempt = now;
    }

    fn send_unconnected(&mut self, pkt: RaknetPacket) {
        self.outgoing.push_back(pkt.to_bytes());
    }

    /// Handles a raw unconnected datagram (request/reply 1 and 2).
    pub(super) fn handle_offline(
        &mut self,
        cursor: &mut Cursor,
        now: Instant,
    ) -> Result<(), RaknetError> {
        let pkt = RaknetPacket::decode(cursor)?;
        match (self.role, pkt) {
            (SessionRole::Responder, RaknetPacket::OpenConnectionRequest1(req)) => {
                self.on_request1(req);
                Ok(())
            }
            (SessionRole::Responder, RaknetPacket::OpenConnectionRequest2(req)) => {
                self.on_request2(req);
                Ok(())
            }
            (SessionRole::Initiator, RaknetPacket::OpenConnectionReply1(reply)) => {
                self.on_reply1(reply, now);
                Ok(())
            }
            (SessionRole::Initiator, RaknetPacket::OpenConnectionReply2(reply)) => {
                self.on_reply2(reply, now)
            }
            (SessionRole::Initiator, RaknetPacket::IncompatibleProtocolVersion(pkt)) => {
                tracing::info!(
                    peer = %self.remote_addr,
                    remote = pkt.protocol,
                    local = self.config.protocol_version,
                    "remote rejected protocol version"
                );
                Err(self.fail(RaknetError::Disconnected(
                    DisconnectReason::IncompatibleProtocolVersion,
                )))
            }
            (role, other) => {
                tracing::debug!(peer = %self.remote_addr, ?role, id = other.id(), "unexpected unconnected packet");
                Ok(())
            }
        }
    }

    fn on_request1(&mut self, req: OpenConnectionRequest1) {
        if req.magic != self.config.magic {
            tracing::debug!(peer = %self.remote_addr, "request 1 with bad magic");
            return;
        }
        if req.protocol_version != self.config.protocol_version {
            tracing::debug!(
                peer = %self.remote_addr,
                remote = req.protocol_version,
                local = self.config.protocol_version,
                "incompatible protocol version"
            );
            self.send_unconnected(
                IncompatibleProtocolVersion {
                    protocol: self.config.protocol_version,
                    magic: self.config.magic,
                    server_guid: self.guid,
                }
                .into(),
            );
            self.close(DisconnectReason::IncompatibleProtocolVersion);
            return;
        }
        if self.state > SessionState::ConnectingPhase1 {
            return;
        }

        self.mtu = req.mtu().min(self.config.mtu_ceiling());
        self.send_unconnected(
            OpenConnectionReply1 {
                magic: self.config.magic,
                server_guid: self.guid,
                cookie: None,
                mtu: self.mtu,
            }
            .into(),
        );
        self.advance_state(SessionState::ConnectingPhase1);
    }

    fn on_request2(&mut self, req: OpenConnectionRequest2) {
        if req.magic != self.config.magic {
            tracing::debug!(peer = %self.remote_addr, "request 2 with bad magic");
            return;
        }
        if self.state < SessionState::ConnectingPhase1 || self.state > SessionState::ConnectingPhase2 {
            tracing::debug!(peer = %self.remote_addr, state = ?self.state, "request 2 out of order");
            return;
        }

        self.mtu = req.mtu.clamp(self.config.min_mtu.min(self.mtu), self.mtu);
        self.remote_guid = Some(req.client_guid);
        self.send_unconnected(
            OpenConnectionReply2 {
                magic: self.config.magic,
                server_guid: self.guid,
                client_addr: self.remote_addr,
                mtu: self.mtu,
                security: false,
            }
            .into(),
        );
        self.advance_state(SessionState::ConnectingPhase2);
    }

    fn on_reply1(&mut self, reply: OpenConnectionReply1, now: Instant) {
        if reply.magic != self.config.magic || self.state != SessionState::ConnectingPhase1 {
            return;
        }
        if reply.cookie.is_some() {
            tracing::debug!(peer = %self.remote_addr, "remote requested security, continuing without");
        }
        self.mtu = reply.mtu.min(self.mtu);
        self.remote_guid = Some(reply.server_guid);
        self.probe.attempts = 0;
        self.advance_state(SessionState::ConnectingPhase2);
        self.send_request2(now);
    }

    fn on_reply2(&mut self, reply: OpenConnectionReply2, now: Instant) -> Result<(), RaknetError> {
        if reply.magic != self.config.magic || self.state != SessionState::ConnectingPhase2 {
            return Ok(());
        }
        self.mtu = reply.mtu.min(self.mtu);

        let timestamp = self.timestamp(now);
        self.probe.request_timestamp = Some(timestamp);
        self.advance_state(SessionState::Handshaking);
        self.queue_packet(
            ConnectionRequest {
                client_guid: self.guid,
                timestamp,
                secure: false,
            }
            .into(),
            HANDSHAKE_RELIABILITY,
            now,
        )
    }

    /// Routes a fully reassembled, in-order payload: control packets feed
    /// the handshake, everything else goes to the application once connected.
    pub(super) fn handle_payload(&mut self, payload: Bytes, now: Instant) -> Result<(), RaknetError> {
        // unconnected ids carry no meaning inside a datagram
        if payload.first().copied().is_some_and(packet::is_offline_packet_id) {
            return self.deliver_user_data(payload);
        }
        let pkt = RaknetPacket::decode(&mut payload.clone())?;
        match pkt {
            RaknetPacket::ConnectionRequest(req) if self.role == SessionRole::Responder => {
                self.on_connection_request(req, now)
            }
            RaknetPacket::ConnectionRequestAccepted(accepted)
                if self.role == SessionRole::Initiator =>
            {
                self.on_server_handshake(accepted, now)
            }
            RaknetPacket::NewIncomingConnection(_) if self.role == SessionRole::Responder => {
                if self.state == SessionState::Handshaking {
                    self.advance_state(SessionState::Connected);
                }
                Ok(())
            }
            RaknetPacket::ConnectedPing(ping) => self.queue_packet(
                ConnectedPong {
                    ping_time: ping.ping_time,
                    pong_time: self.timestamp(now),
                }
                .into(),
                Reliability::Unreliable,
                now,
            ),
            RaknetPacket::ConnectedPong(pong) => {
                let rtt = self.timestamp(now).0.saturating_sub(pong.ping_time.0);
                let latency: Duration = RaknetTime(rtt).into();
                self.latency = Some(latency);
                tracing::trace!(peer = %self.remote_addr, ?latency, "latency updated");
                self.events.push_back(SessionEvent::LatencyUpdated(latency));
                Ok(())
            }
            RaknetPacket::DisconnectionNotification(_) => {
                self.close(DisconnectReason::ClosedByRemotePeer);
                Ok(())
            }
            RaknetPacket::UserData { .. } => self.deliver_user_data(payload),
            other => {
                tracing::debug!(
                    peer = %self.remote_addr,
                    state = ?self.state,
                    id = format_args!("0x{:02x}", other.id()),
                    "dropping packet"
                );
                Ok(())
            }
        }
    }

    /// Hands a payload to the application, holding it back while the
    /// handshake is still finishing.
    fn deliver_user_data(&mut self, payload: Bytes) -> Result<(), RaknetError> {
        if self.is_connected() {
            self.events.push_back(SessionEvent::Message(payload));
            return Ok(());
        }
        if self.state < SessionState::Handshaking {
            tracing::debug!(peer = %self.remote_addr, state = ?self.state, "user data before handshake");
            return Ok(());
        }
        let limit = self.config.max_ordering_buffer;
        if self.early_messages.len() >= limit {
            return Err(self.fail(RaknetError::QueueTooLong {
                len: self.early_messages.len(),
                limit,
            }));
        }
        self.early_messages.push_back(payload);
        Ok(())
    }

    fn on_connection_request(&mut self, req: ConnectionRequest, now: Instant) -> Result<(), RaknetError> {
        if self.state != SessionState::ConnectingPhase2 {
            return Ok(());
        }
        self.remote_guid.get_or_insert(req.client_guid);
        self.advance_state(SessionState::Handshaking);
        self.queue_packet(
            ConnectionRequestAccepted {
                client_addr: self.remote_addr,
                system_index: 0,
                system_addresses: constants::SYSTEM_ADDRESSES,
                request_timestamp: req.timestamp,
                accepted_timestamp: self.timestamp(now),
            }
            .into(),
            HANDSHAKE_RELIABILITY,
            now,
        )
    }

    fn on_server_handshake(
        &mut self,
        accepted: ConnectionRequestAccepted,
        now: Instant,
    ) -> Result<(), RaknetError> {
        if self.state != SessionState::Handshaking {
            return Ok(());
        }
        let Some(sent) = self.probe.request_timestamp else {
            return Ok(());
        };
        if accepted.request_timestamp != sent {
            tracing::debug!(
                peer = %self.remote_addr,
                sent = sent.0,
                echoed = accepted.request_timestamp.0,
                "server handshake timestamp mismatch"
            );
            return Ok(());
        }

        let now_ts = self.timestamp(now);
        self.queue_packet(
            NewIncomingConnection {
                server_addr: self.remote_addr,
                system_addresses: constants::SYSTEM_ADDRESSES,
                request_timestamp: accepted.accepted_timestamp,
                accepted_timestamp: now_ts,
            }
            .into(),
            HANDSHAKE_RELIABILITY,
            now,
        )?;
        self.latency = Some(RaknetTime(now_ts.0.saturating_sub(sent.0)).into());
        self.advance_state(SessionState::Connected);
        Ok(())
    }

    /// Graceful close: notifies the peer and closes locally.
    pub fn disconnect(&mut self, now: Instant) {
        if self.is_closed() {
            return;
        }
        if self.state >= SessionState::Handshaking {
            let _ = self.queue_packet(
                DisconnectionNotification.into(),
                Reliability::ReliableOrdered,
                now,
            );
            self.flush_acks();
        }
        self.close(DisconnectReason::Disconnected);
    }
}
