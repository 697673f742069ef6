//! Run-length compressed acknowledgment records (ACK `0xC0`, NACK `0xA0`).
//!
//! Layout after the id byte: u16 record count, then per record a bool
//! discriminator (`true` = single value) followed by one or two triads.

use bytes::{Buf, BufMut};

use crate::protocol::{
    constants::{DatagramFlags, MAXIMUM_ACK_EXPANSION, MAXIMUM_ACK_RANGE},
    packet::{DecodeError, RaknetEncodable},
    types::Sequence24,
};

/// Inclusive run of datagram sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceRange {
    pub start: Sequence24,
    pub end: Sequence24,
}

impl SequenceRange {
    pub fn single(seq: Sequence24) -> Self {
        Self {
            start: seq,
            end: seq,
        }
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    /// Number of sequence numbers covered.
    pub fn len(&self) -> u32 {
        self.end.distance_from(self.start) + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = Sequence24> + use<> {
        let start = self.start;
        (0..self.len()).map(move |i| start + i)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckNackPayload {
    pub ranges: Vec<SequenceRange>,
}

impl AckNackPayload {
    /// Coalesces ascending sequence numbers into maximal consecutive runs.
    pub fn compress(sequences: &[Sequence24]) -> Self {
        let mut ranges: Vec<SequenceRange> = Vec::new();
        for &seq in sequences {
            match ranges.last_mut() {
                Some(last) if last.end.next() == seq => last.end = seq,
                Some(last) if last.end == seq => {}
                _ => ranges.push(SequenceRange::single(seq)),
            }
        }
        Self { ranges }
    }

    /// Every sequence number covered, in record order.
    pub fn expand(&self) -> Vec<Sequence24> {
        self.ranges.iter().flat_map(SequenceRange::iter).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl RaknetEncodable for AckNackPayload {
    fn encode_raknet(&self, dst: &mut impl BufMut) {
        let count = self.ranges.len().min(u16::MAX as usize);
        (count as u16).encode_raknet(dst);
        for range in &self.ranges[..count] {
            range.is_single().encode_raknet(dst);
            range.start.encode_raknet(dst);
            if !range.is_single() {
                range.end.encode_raknet(dst);
            }
        }
    }

    /// Ranges longer than [`MAXIMUM_ACK_RANGE`] are clipped and decoding
    /// stops once [`MAXIMUM_ACK_EXPANSION`] values have been covered.
    fn decode_raknet(src: &mut impl Buf) -> Result<Self, DecodeError> {
        let count = u16::decode_raknet(src)?;
        let mut ranges = Vec::with_capacity((count as usize).min(64));
        let mut expanded = 0usize;

        for _ in 0..count {
            let single = bool::decode_raknet(src)?;
            let start = Sequence24::decode_raknet(src)?;
            let mut end = if single {
                start
            } else {
                Sequence24::decode_raknet(src)?
            };

            let mut range = SequenceRange { start, end };
            if range.len() > MAXIMUM_ACK_RANGE {
                end = start + (MAXIMUM_ACK_RANGE - 1);
                range.end = end;
            }

            let budget = MAXIMUM_ACK_EXPANSION - expanded;
            if budget == 0 {
                break;
            }
            if range.len() as usize > budget {
                range.end = start + (budget as u32 - 1);
            }
            expanded += range.len() as usize;
            ranges.push(range);
        }

        Ok(Self { ranges })
    }
}

/// Which of the two acknowledgment records a buffer carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Ack,
    Nack,
}

impl AckKind {
    pub fn id(self) -> u8 {
        match self {
            AckKind::Ack => DatagramFlags::ACK_RECORD.bits(),
            AckKind::Nack => DatagramFlags::NACK_RECORD.bits(),
        }
    }

    /// Classifies a datagram flags byte; `None` for data datagrams.
    pub fn from_flags(raw: u8) -> Option<Self> {
        let flags = DatagramFlags::from_bits_truncate(raw);
        if !flags.contains(DatagramFlags::VALID) {
            None
        } else if flags.contains(DatagramFlags::ACK) {
            Some(AckKind::Ack)
        } else if flags.contains(DatagramFlags::NACK) {
            Some(AckKind::Nack)
        } else {
            None
        }
    }
}

/// A whole acknowledgment record as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckRecord {
    pub kind: AckKind,
    pub payload: AckNackPayload,
}

impl AckRecord {
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.kind.id());
        self.payload.encode_raknet(dst);
    }

    /// Decodes a record that must be of `expected` kind.
    pub fn decode_expecting(src: &mut impl Buf, expected: AckKind) -> Result<Self, DecodeError> {
        let found = u8::decode_raknet(src)?;
        if AckKind::from_flags(found) != Some(expected) {
            return Err(DecodeError::UnexpectedId {
                expected: expected.id(),
                found,
            });
        }
        Ok(Self {
            kind: expected,
            payload: AckNackPayload::decode_raknet(src)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn seqs(values: &[u32]) -> Vec<Sequence24> {
        values.iter().copied().map(Sequence24::new).collect()
    }

    #[test]
    fn compress_coalesces_runs() {
        let payload = AckNackPayload::compress(&seqs(&[1, 2, 3, 5, 7, 8]));
        assert_eq!(payload.ranges.len(), 3);
        assert_eq!(payload.ranges[0].len(), 3);
        assert!(payload.ranges[1].is_single());
        assert_eq!(payload.ranges[2].end, Sequence24::new(8));
    }

    #[test]
    fn compress_handles_wrap() {
        let payload = AckNackPayload::compress(&seqs(&[0xFF_FFFE, 0xFF_FFFF, 0, 1]));
        assert_eq!(payload.ranges.len(), 1);
        assert_eq!(payload.expand(), seqs(&[0xFF_FFFE, 0xFF_FFFF, 0, 1]));
    }

    #[test]
    fn record_roundtrip_expands_to_input() {
        let input = seqs(&[4, 5, 6, 10, 12, 13, 14, 15, 100]);
        let record = AckRecord {
            kind: AckKind::Ack,
            payload: AckNackPayload::compress(&input),
        };
        let mut buf = BytesMut::new();
        record.encode(&mut buf);
        assert_eq!(buf[0], 0xC0);

        let decoded = AckRecord::decode_expecting(&mut buf.freeze(), AckKind::Ack).unwrap();
        assert_eq!(decoded.payload.expand(), input);
    }

    #[test]
    fn single_entry_wire_layout() {
        let payload = AckNackPayload::compress(&seqs(&[2]));
        let mut buf = BytesMut::new();
        payload.encode_raknet(&mut buf);
        assert_eq!(&buf[..], &[0x00, 0x01, 0x01, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn wrong_kind_is_a_protocol_violation() {
        let record = AckRecord {
            kind: AckKind::Nack,
            payload: AckNackPayload::compress(&seqs(&[1])),
        };
        let mut buf = BytesMut::new();
        record.encode(&mut buf);
        assert_eq!(
            AckRecord::decode_expecting(&mut buf.freeze(), AckKind::Ack),
            Err(DecodeError::UnexpectedId {
                expected: 0xC0,
                found: 0xA0
            })
        );
    }

    #[test]
    fn oversized_range_is_clipped() {
        let mut buf = BytesMut::new();
        1u16.encode_raknet(&mut buf);
        false.encode_raknet(&mut buf);
        Sequence24::new(0).encode_raknet(&mut buf);
        Sequence24::new(10_000).encode_raknet(&mut buf);

        let decoded = AckNackPayload::decode_raknet(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.expand().len(), MAXIMUM_ACK_RANGE as usize);
    }

    #[test]
    fn total_expansion_is_capped() {
        let mut buf = BytesMut::new();
        20u16.encode_raknet(&mut buf);
        for i in 0..20u32 {
            false.encode_raknet(&mut buf);
            Sequence24::new(i * 1000).encode_raknet(&mut buf);
            Sequence24::new(i * 1000 + 499).encode_raknet(&mut buf);
        }

        let decoded = AckNackPayload::decode_raknet(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.expand().len(), MAXIMUM_ACK_EXPANSION);
    }

    #[test]
    fn truncated_record_is_eof() {
        let mut src: &[u8] = &[0x00, 0x02, 0x01, 0x05, 0x00, 0x00];
        assert_eq!(
            AckNackPayload::decode_raknet(&mut src),
            Err(DecodeError::UnexpectedEof)
        );
    }
}
