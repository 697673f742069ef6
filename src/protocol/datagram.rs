use bytes::{Buf, BufMut, Bytes};

use crate::protocol::{
    cursor::Cursor,
    encapsulated_packet::EncapsulatedPacket,
    packet::{DecodeError, RaknetEncodable},
    types::{DatagramHeader, Sequence24},
};

/// Unit placed on the wire: a sequence number followed by encapsulated
/// packets until the buffer is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub header: DatagramHeader,
    pub packets: Vec<EncapsulatedPacket>,
}

impl Datagram {
    pub fn new(sequence: Sequence24, packets: Vec<EncapsulatedPacket>) -> Self {
        Self {
            header: DatagramHeader::new(sequence),
            packets,
        }
    }

    pub fn sequence(&self) -> Sequence24 {
        self.header.sequence
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        self.header.encode(dst);
        for pkt in &self.packets {
            pkt.encode_raknet(dst);
        }
    }

    pub fn decode(src: &mut impl Buf) -> Result<Self, DecodeError> {
        let header = DatagramHeader::decode(src)?;
        let mut packets = Vec::new();
        while src.has_remaining() {
            packets.push(EncapsulatedPacket::decode_raknet(src)?);
        }
        Ok(Self { header, packets })
    }

    pub fn to_bytes(&self) -> Bytes {
        let size = 4 + self.packets.iter().map(|p| p.encoded_len()).sum::<usize>();
        let mut cursor = Cursor::with_capacity(size);
        self.encode(cursor.writer());
        cursor.freeze()
    }
}
