use bytes::{Buf, BufMut};

use crate::protocol::{
    constants::DatagramFlags,
    packet::{DecodeError, RaknetEncodable},
    types::Sequence24,
};

/// Flags byte plus the little-endian sequence number that open every
/// data datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    pub flags: DatagramFlags,
    pub sequence: Sequence24,
}

impl DatagramHeader {
    pub fn new(sequence: Sequence24) -> Self {
        Self {
            flags: DatagramFlags::DATA,
            sequence,
        }
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.flags.bits());
        self.sequence.encode_raknet(dst);
    }

    pub fn decode(src: &mut impl Buf) -> Result<Self, DecodeError> {
        if src.remaining() < 4 {
            return Err(DecodeError::UnexpectedEof);
        }
        let raw_flags = src.get_u8();
        let flags = DatagramFlags::from_bits_truncate(raw_flags);
        if !flags.contains(DatagramFlags::VALID) || flags.intersects(DatagramFlags::ACK) {
            return Err(DecodeError::UnexpectedId {
                expected: DatagramFlags::DATA.bits(),
                found: raw_flags,
            });
        }
        let sequence = Sequence24::decode_raknet(src)?;
        Ok(DatagramHeader { flags, sequence })
    }
}
