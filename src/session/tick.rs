use std::time::Instant;

use super::Session;
use crate::RaknetError;
use crate::protocol::{
    packet::ConnectedPing,
    reliability::Reliability,
    state::{DisconnectReason, SessionRole, SessionState},
    types::Sequence24,
};

impl Session {
    /// Periodic maintenance: handshake retries, receive timeout, keep-alive,
    /// retransmission and housekeeping of the receive-side tables.
    ///
    /// Returns an error once the session has given up on the peer.
    pub fn tick(&mut self, now: Instant) -> Result<(), RaknetError> {
        if self.is_closed() {
            return Ok(());
        }

        match (self.role, self.state) {
            // the peer has not answered at all yet, so there is nothing to time out
            (SessionRole::Initiator, SessionState::ConnectingPhase1) => return self.tick_probe(now),
            (SessionRole::Initiator, SessionState::ConnectingPhase2) => self.tick_request2(now)?,
            _ => {}
        }

        let idle = now.saturating_duration_since(self.last_receive);
        if idle >= self.config.session_timeout {
            tracing::debug!(peer = %self.remote_addr, ?idle, state = ?self.state, "receive timeout");
            return Err(self.fail(RaknetError::Disconnected(DisconnectReason::TimedOut)));
        }

        if self.is_connected()
            && now.saturating_duration_since(self.last_ping) >= self.config.keepalive_interval
        {
            self.last_ping = now;
            let ping = ConnectedPing {
                ping_time: self.timestamp(now),
            };
            self.queue_packet(ping.into(), Reliability::Unreliable, now)?;
        }

        self.resend_stale(now);

        self.received.prune();
        self.splits.expire(now, self.config.session_timeout);
        self.flush_acks();
        Ok(())
    }

    fn tick_probe(&mut self, now: Instant) -> Result<(), RaknetError> {
        if now.saturating_duration_since(self.probe.last_attempt) < self.config.connect_attempt_interval {
            return Ok(());
        }
        if self.probe.attempts >= self.config.mtu_probe_attempts {
            if self.probe.size_index + 1 >= self.config.mtu_probe_sizes().len() {
                return Err(self.fail(RaknetError::MtuDiscoveryFailed {
                    floor: self.config.min_mtu,
                }));
            }
            self.probe.size_index += 1;
            self.probe.attempts = 0;
        }
        self.send_request1(now);
        Ok(())
    }

    fn tick_request2(&mut self, now: Instant) -> Result<(), RaknetError> {
        if now.saturating_duration_since(self.probe.last_attempt) < self.config.connect_attempt_interval {
            return Ok(());
        }
        if self.probe.attempts >= self.config.max_connect_attempts {
            return Err(self.fail(RaknetError::HandshakeTimedOut));
        }
        self.send_request2(now);
        Ok(())
    }

    /// Resends reliable datagrams left unacknowledged past the resend
    /// interval and forgets unreliable ones of the same age.
    fn resend_stale(&mut self, now: Instant) {
        let interval = self.config.resend_interval;
        let mut stale: Vec<Sequence24> = self
            .reliable_queue
            .iter()
            .filter(|(_, tracked)| now.saturating_duration_since(tracked.sent_at) >= interval)
            .map(|(&seq, _)| seq)
            .collect();
        let next = self.send_seq;
        stale.sort_by_key(|seq| std::cmp::Reverse(next.distance_from(*seq)));

        if !stale.is_empty() {
            tracing::trace!(peer = %self.remote_addr, count = stale.len(), "resending unacked datagrams");
        }
        for seq in stale {
            self.resend(seq, now);
        }

        let reliable = &self.reliable_queue;
        self.recovery_queue.retain(|seq, tracked| {
            reliable.contains_key(seq) || now.saturating_duration_since(tracked.sent_at) < interval
        });
    }
}
