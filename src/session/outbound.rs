use std::cmp::Reverse;
use std::mem;
use std::time::Instant;

use bytes::Bytes;

use super::{Session, TrackedDatagram};
use crate::RaknetError;
use crate::protocol::{
    ack::{AckKind, AckNackPayload, AckRecord},
    constants::{MAXIMUM_ORDERING_CHANNELS, RAKNET_DATAGRAM_HEADER_SIZE, UDP_HEADER_SIZE},
    cursor::Cursor,
    datagram::Datagram,
    encapsulated_packet::{EncapsulatedPacket, OrderInfo, SplitInfo},
    packet::RaknetPacket,
    reliability::Reliability,
    types::Sequence24,
};

impl Session {
    /// Queues an application payload (id byte included) for delivery.
    pub fn send(
        &mut self,
        payload: Bytes,
        reliability: Reliability,
        channel: u8,
        now: Instant,
    ) -> Result<(), RaknetError> {
        if self.is_closed() {
            return Err(RaknetError::ConnectionClosed);
        }
        if !self.is_connected() {
            return Err(RaknetError::NotConnected);
        }
        if payload.is_empty() {
            return Err(RaknetError::EmptyPayload);
        }
        self.queue_payload(payload, reliability, channel, now)
    }

    pub(super) fn queue_packet(
        &mut self,
        pkt: RaknetPacket,
        reliability: Reliability,
        now: Instant,
    ) -> Result<(), RaknetError> {
        self.queue_payload(pkt.to_bytes(), reliability, 0, now)
    }

    /// Bytes left for encapsulated packets once UDP/IP and datagram headers
    /// are taken out of the MTU.
    fn datagram_capacity(&self) -> usize {
        (self.mtu as usize).saturating_sub(UDP_HEADER_SIZE + RAKNET_DATAGRAM_HEADER_SIZE)
    }

    fn queue_payload(
        &mut self,
        payload: Bytes,
        reliability: Reliability,
        channel: u8,
        now: Instant,
    ) -> Result<(), RaknetError> {
        if channel >= MAXIMUM_ORDERING_CHANNELS {
            return Err(RaknetError::InvalidChannel(channel));
        }

        let capacity = self.datagram_capacity();
        let split_header = EncapsulatedPacket::header_size(reliability, true);
        let fragment_size = capacity.saturating_sub(split_header).max(1);
        let count = payload.len().div_ceil(fragment_size);
        if count > self.config.max_split_count as usize {
            return Err(RaknetError::PayloadTooLarge {
                len: payload.len(),
                limit: self.config.max_split_count,
            });
        }

        let order = if reliability.is_sequenced() {
            let slot = &mut self.send_sequence_index[channel as usize];
            let index = *slot;
            *slot = index.next();
            Some(OrderInfo { index, channel })
        } else if reliability.is_ordered() {
            let slot = &mut self.send_order_index[channel as usize];
            let index = *slot;
            *slot = index.next();
            Some(OrderInfo { index, channel })
        } else {
            None
        };

        if split_header + payload.len() <= capacity {
            let pkt = EncapsulatedPacket {
                reliable_index: self.next_reliable_index(reliability),
                order,
                ..EncapsulatedPacket::new(reliability, payload)
            };
            return self.send_datagram(pkt, now);
        }

        let id = self.next_split_id;
        self.next_split_id = self.next_split_id.wrapping_add(1);
        tracing::trace!(peer = %self.remote_addr, split_id = id, count, len = payload.len(), "splitting payload");

        for index in 0..count {
            let start = index * fragment_size;
            let end = (start + fragment_size).min(payload.len());
            let pkt = EncapsulatedPacket {
                reliable_index: self.next_reliable_index(reliability),
                order,
                split: Some(SplitInfo {
                    count: count as u32,
                    id,
                    index: index as u32,
                }),
                ..EncapsulatedPacket::new(reliability, payload.slice(start..end))
            };
            self.send_datagram(pkt, now)?;
        }
        Ok(())
    }

    fn next_reliable_index(&mut self, reliability: Reliability) -> Option<Sequence24> {
        if !reliability.is_reliable() {
            return None;
        }
        let index = self.send_message_index;
        self.send_message_index = index.next();
        Some(index)
    }

    /// Wraps one packet in a fresh datagram and records it for recovery.
    fn send_datagram(&mut self, pkt: EncapsulatedPacket, now: Instant) -> Result<(), RaknetError> {
        let limit = self.config.max_queued_datagrams;
        if self.recovery_queue.len() >= limit {
            return Err(self.fail(RaknetError::QueueTooLong {
                len: self.recovery_queue.len(),
                limit,
            }));
        }

        let reliable = pkt.reliability.is_reliable();
        let seq = self.send_seq;
        self.send_seq = seq.next();
        let bytes = Datagram::new(seq, vec![pkt]).to_bytes();

        tracing::trace!(peer = %self.remote_addr, seq = seq.value(), len = bytes.len(), reliable, "send datagram");

        let tracked = TrackedDatagram {
            bytes: bytes.clone(),
            sent_at: now,
        };
        if reliable {
            self.reliable_queue.insert(seq, tracked.clone());
        }
        self.recovery_queue.insert(seq, tracked);
        self.outgoing.push_back(bytes);
        self.last_send = now;
        Ok(())
    }

    /// Sends a recorded datagram again under its original sequence number.
    pub(super) fn resend(&mut self, seq: Sequence24, now: Instant) -> bool {
        let Some(tracked) = self.recovery_queue.get_mut(&seq) else {
            return false;
        };
        tracked.sent_at = now;
        let bytes = tracked.bytes.clone();
        if let Some(reliable) = self.reliable_queue.get_mut(&seq) {
            reliable.sent_at = now;
        }
        self.outgoing.push_back(bytes);
        self.last_send = now;
        true
    }

    /// Emits pending ACK and NACK records, one of each at most.
    pub(super) fn flush_acks(&mut self) {
        let acks = mem::take(&mut self.pending_acks);
        let nacks = mem::take(&mut self.pending_nacks);
        for (kind, mut pending) in [(AckKind::Ack, acks), (AckKind::Nack, nacks)] {
            if pending.is_empty() {
                continue;
            }
            // everything pending is behind the next expected sequence
            let next = self.receive_seq;
            pending.sort_by_key(|seq| Reverse(next.distance_from(*seq)));
            pending.dedup();

            let record = AckRecord {
                kind,
                payload: AckNackPayload::compress(&pending),
            };
            if tracing::enabled!(tracing::Level::TRACE) {
                tracing::trace!(peer = %self.remote_addr, ?kind, ranges = record.payload.ranges.len(), "flush");
            }
            let mut cursor = Cursor::new();
            record.encode(cursor.writer());
            self.outgoing.push_back(cursor.freeze());
        }
    }
}
