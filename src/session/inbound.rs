use std::time::Instant;

use super::Session;
use super::ordering::Ordered;
use crate::RaknetError;
use crate::protocol::{
    ack::{AckKind, AckRecord},
    constants::{DatagramFlags, MAXIMUM_ACK_EXPANSION, MAXIMUM_ORDERING_CHANNELS},
    cursor::Cursor,
    datagram::Datagram,
    encapsulated_packet::EncapsulatedPacket,
    packet::DecodeError,
};

impl Session {
    /// Feeds one raw datagram received from the peer.
    ///
    /// Decode faults drop the datagram and leave the session usable; only
    /// errors for which [`RaknetError::is_fatal`] holds have closed it.
    pub fn handle_datagram(&mut self, bytes: &[u8], now: Instant) -> Result<(), RaknetError> {
        if self.is_closed() {
            return Err(RaknetError::ConnectionClosed);
        }
        let Some(&first) = bytes.first() else {
            return Err(DecodeError::UnexpectedEof.into());
        };
        let mut cursor = Cursor::from(bytes);

        if first & DatagramFlags::VALID.bits() == 0 {
            self.last_receive = now;
            return self.handle_offline(&mut cursor, now);
        }

        match AckKind::from_flags(first) {
            Some(kind) => {
                let record = AckRecord::decode_expecting(&mut cursor, kind)?;
                self.last_receive = now;
                match kind {
                    AckKind::Ack => self.on_ack(&record),
                    AckKind::Nack => self.on_nack(&record, now),
                }
                Ok(())
            }
            None => {
                let datagram = Datagram::decode(&mut cursor)?;
                self.last_receive = now;
                self.on_datagram(datagram, now)
            }
        }
    }

    fn on_ack(&mut self, record: &AckRecord) {
        for seq in record.payload.expand() {
            self.recovery_queue.remove(&seq);
            self.reliable_queue.remove(&seq);
        }
    }

    fn on_nack(&mut self, record: &AckRecord, now: Instant) {
        let mut resent = 0usize;
        for seq in record.payload.expand() {
            if self.resend(seq, now) {
                resent += 1;
            }
        }
        tracing::trace!(peer = %self.remote_addr, resent, "nack");
    }

    fn on_datagram(&mut self, datagram: Datagram, now: Instant) -> Result<(), RaknetError> {
        let seq = datagram.sequence();
        tracing::trace!(peer = %self.remote_addr, seq = seq.value(), packets = datagram.packets.len(), "recv datagram");

        // acknowledged even when it turns out to be a duplicate
        self.pending_acks.push(seq);
        if !self.received.insert(seq) {
            tracing::trace!(peer = %self.remote_addr, seq = seq.value(), "duplicate datagram");
            self.flush_acks();
            return Ok(());
        }

        if seq >= self.receive_seq {
            let gap = seq.distance_from(self.receive_seq);
            if gap as usize > MAXIMUM_ACK_EXPANSION {
                tracing::debug!(peer = %self.remote_addr, seq = seq.value(), gap, "sequence jump too large to nack");
            } else {
                let missing = self.receive_seq;
                self.pending_nacks.extend((0..gap).map(|i| missing + i));
            }
            self.receive_seq = seq.next();
        }

        let mut result = Ok(());
        for pkt in datagram.packets {
            if let Err(err) = self.handle_encapsulated(pkt, now) {
                tracing::debug!(peer = %self.remote_addr, error = %err, "dropping packet");
                if result.is_ok() {
                    result = Err(err);
                }
            }
            if self.is_closed() {
                break;
            }
        }
        self.flush_acks();
        result
    }

    fn handle_encapsulated(
        &mut self,
        pkt: EncapsulatedPacket,
        now: Instant,
    ) -> Result<(), RaknetError> {
        if let Some(order) = pkt.order
            && order.channel >= MAXIMUM_ORDERING_CHANNELS
        {
            return Err(DecodeError::InvalidChannel(order.channel).into());
        }

        let pkt = match self.splits.add(pkt, now) {
            Ok(Some(whole)) => whole,
            Ok(None) => return Ok(()),
            Err(err) => return Err(self.fail(err)),
        };

        let Some(order) = pkt.order else {
            return self.handle_payload(pkt.payload, now);
        };

        if pkt.reliability.is_sequenced() {
            if !self.ordering.accept_sequenced(order.channel, order.index) {
                tracing::trace!(peer = %self.remote_addr, channel = order.channel, index = order.index.value(), "stale sequenced packet");
                return Ok(());
            }
            return self.handle_payload(pkt.payload, now);
        }

        match self.ordering.accept_ordered(order.channel, order.index, pkt.payload) {
            Ordered::Release(payloads) => {
                let mut result = Ok(());
                for payload in payloads {
                    if self.is_closed() {
                        break;
                    }
                    if let Err(err) = self.handle_payload(payload, now)
                        && result.is_ok()
                    {
                        result = Err(err);
                    }
                }
                result
            }
            Ordered::Overflow => Err(self.fail(RaknetError::OrderingBufferFull {
                channel: order.channel,
                limit: self.config.max_ordering_buffer,
            })),
        }
    }
}
