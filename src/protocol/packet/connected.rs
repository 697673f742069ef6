//! Control packets exchanged inside datagrams once a session exists.

use bytes::{Buf, BufMut};

use crate::protocol::{
    packet::{DecodeError, Packet, RaknetEncodable},
    types::RaknetTime,
};

/// Keep-alive probe; the peer echoes `ping_time` in a [`ConnectedPong`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedPing {
    pub ping_time: RaknetTime,
}

impl Packet for ConnectedPing {
    const ID: u8 = 0x00;

    fn encode_body(&self, dst: &mut impl BufMut) {
        self.ping_time.encode_raknet(dst);
    }

    fn decode_body(src: &mut impl Buf) -> Result<Self, DecodeError> {
        Ok(Self {
            ping_time: RaknetTime::decode_raknet(src)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedPong {
    pub ping_time: RaknetTime,
    pub pong_time: RaknetTime,
}

impl Packet for ConnectedPong {
    const ID: u8 = 0x03;

    fn encode_body(&self, dst: &mut impl BufMut) {
        self.ping_time.encode_raknet(dst);
        self.pong_time.encode_raknet(dst);
    }

    fn decode_body(src: &mut impl Buf) -> Result<Self, DecodeError> {
        Ok(Self {
            ping_time: RaknetTime::decode_raknet(src)?,
            pong_time: RaknetTime::decode_raknet(src)?,
        })
    }
}

/// Close-connection notice. Any trailing bytes are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectionNotification;

impl Packet for DisconnectionNotification {
    const ID: u8 = 0x15;

    fn encode_body(&self, _dst: &mut impl BufMut) {}

    fn decode_body(src: &mut impl Buf) -> Result<Self, DecodeError> {
        src.advance(src.remaining());
        Ok(Self)
    }
}
