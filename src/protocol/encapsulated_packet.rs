use crate::protocol::{
    packet::{DecodeError, RaknetEncodable},
    reliability::Reliability,
    types::Sequence24,
};
use bytes::{Buf, BufMut, Bytes};

const SPLIT_FLAG: u8 = 0b0001_0000;

/// Fragment descriptor of a split message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitInfo {
    pub count: u32,
    pub id: u16,
    pub index: u32,
}

/// Order index plus the channel it is counted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderInfo {
    pub index: Sequence24,
    pub channel: u8,
}

/// One application payload with its delivery metadata.
///
/// `reliable_index` is present iff the reliability is reliable, `order`
/// iff it is ordered or sequenced, `split` iff the packet is a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncapsulatedPacket {
    pub reliability: Reliability,
    pub reliable_index: Option<Sequence24>,
    pub order: Option<OrderInfo>,
    pub split: Option<SplitInfo>,
    pub payload: Bytes,
}

impl EncapsulatedPacket {
    pub fn new(reliability: Reliability, payload: Bytes) -> Self {
        Self {
            reliability,
            reliable_index: None,
            order: None,
            split: None,
            payload,
        }
    }

    /// Encoded header length for a given delivery mode.
    pub fn header_size(reliability: Reliability, is_split: bool) -> usize {
        let mut size = 1 + 2;
        if reliability.is_reliable() {
            size += 3;
        }
        if reliability.has_order_info() {
            size += 3 + 1;
        }
        if is_split {
            size += 4 + 2 + 4;
        }
        size
    }

    pub fn is_split(&self) -> bool {
        self.split.is_some()
    }

    pub fn encoded_len(&self) -> usize {
        Self::header_size(self.reliability, self.is_split()) + self.payload.len()
    }
}

impl RaknetEncodable for EncapsulatedPacket {
    fn encode_raknet(&self, dst: &mut impl BufMut) {
        let mut flags = self.reliability.code() << 5;
        if self.is_split() {
            flags |= SPLIT_FLAG;
        }
        dst.put_u8(flags);

        // length travels in bits
        ((self.payload.len() as u16) << 3).encode_raknet(dst);

        if self.reliability.is_reliable() {
            self.reliable_index
                .unwrap_or_default()
                .encode_raknet(dst);
        }

        if self.reliability.has_order_info() {
            let order = self.order.unwrap_or(OrderInfo {
                index: Sequence24::ZERO,
                channel: 0,
            });
            order.index.encode_raknet(dst);
            order.channel.encode_raknet(dst);
        }

        if let Some(split) = &self.split {
            split.count.encode_raknet(dst);
            split.id.encode_raknet(dst);
            split.index.encode_raknet(dst);
        }

        dst.put_slice(&self.payload);
    }

    fn decode_raknet(src: &mut impl Buf) -> Result<Self, DecodeError> {
        let flags = u8::decode_raknet(src)?;
        let reliability = Reliability::from_code(flags >> 5)?;
        let is_split = flags & SPLIT_FLAG != 0;

        let bit_length = u16::decode_raknet(src)?;
        let payload_len = ((bit_length as usize) + 7) >> 3;

        let reliable_index = if reliability.is_reliable() {
            Some(Sequence24::decode_raknet(src)?)
        } else {
            None
        };

        let order = if reliability.has_order_info() {
            let index = Sequence24::decode_raknet(src)?;
            let channel = u8::decode_raknet(src)?;
            Some(OrderInfo { index, channel })
        } else {
            None
        };

        let split = if is_split {
            let count = u32::decode_raknet(src)?;
            let id = u16::decode_raknet(src)?;
            let index = u32::decode_raknet(src)?;
            if count == 0 || index >= count {
                return Err(DecodeError::InvalidSplit { index, count });
            }
            Some(SplitInfo { count, id, index })
        } else {
            None
        };

        if src.remaining() < payload_len {
            return Err(DecodeError::UnexpectedEof);
        }
        let payload = src.copy_to_bytes(payload_len);

        Ok(EncapsulatedPacket {
            reliability,
            reliable_index,
            order,
            split,
            payload,
        })
    }
}
