use crate::protocol::packet::{DecodeError, RaknetEncodable};
use bytes::{Buf, BufMut};
use std::{
    mem,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6},
    time::Duration,
};

mod datagram_header;
mod sequence;

pub use datagram_header::DatagramHeader;
pub use sequence::Sequence24;

pub type Magic = [u8; 16];

macro_rules! impl_raknet_int {
    ($ty:ty, $put:ident, $get:ident) => {
        impl RaknetEncodable for $ty {
            fn encode_raknet(&self, dst: &mut impl BufMut) {
                dst.$put(*self as _);
            }

            fn decode_raknet(src: &mut impl Buf) -> Result<Self, DecodeError> {
                let size = mem::size_of::<$ty>();
                if src.remaining() < size {
                    return Err(DecodeError::UnexpectedEof);
                }
                Ok(src.$get() as $ty)
            }
        }
    };
}

// Unsigned big-endian ints:
impl_raknet_int!(u8, put_u8, get_u8);
impl_raknet_int!(u16, put_u16, get_u16);
impl_raknet_int!(u32, put_u32, get_u32);
impl_raknet_int!(u64, put_u64, get_u64);

// Signed big-endian ints:
impl_raknet_int!(i8, put_i8, get_i8);
impl_raknet_int!(i64, put_i64, get_i64);

/// The "triad": an unsigned 24-bit integer, little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U24LE(pub u32);

impl RaknetEncodable for U24LE {
    fn encode_raknet(&self, dst: &mut impl BufMut) {
        let v = self.0;
        dst.put_u8((v & 0xFF) as u8);
        dst.put_u8(((v >> 8) & 0xFF) as u8);
        dst.put_u8(((v >> 16) & 0xFF) as u8);
    }

    fn decode_raknet(src: &mut impl Buf) -> Result<Self, DecodeError> {
        if src.remaining() < 3 {
            return Err(DecodeError::UnexpectedEof);
        }
        let b0 = src.get_u8() as u32;
        let b1 = src.get_u8() as u32;
        let b2 = src.get_u8() as u32;
        Ok(U24LE(b0 | (b1 << 8) | (b2 << 16)))
    }
}

impl RaknetEncodable for bool {
    fn encode_raknet(&self, dst: &mut impl BufMut) {
        dst.put_u8(if *self { 1 } else { 0 });
    }

    fn decode_raknet(src: &mut impl Buf) -> Result<Self, DecodeError> {
        if !src.has_remaining() {
            return Err(DecodeError::UnexpectedEof);
        }
        Ok(src.get_u8() != 0)
    }
}

impl RaknetEncodable for Magic {
    fn encode_raknet(&self, dst: &mut impl BufMut) {
        dst.put_slice(self);
    }

    fn decode_raknet(src: &mut impl Buf) -> Result<Self, DecodeError> {
        if src.remaining() < mem::size_of::<Self>() {
            return Err(DecodeError::UnexpectedEof);
        }
        let mut magic = [0u8; 16];
        src.copy_to_slice(&mut magic);
        Ok(magic)
    }
}

/// u16 big-endian byte length followed by UTF-8 bytes.
impl RaknetEncodable for String {
    fn encode_raknet(&self, dst: &mut impl BufMut) {
        let len = self.len().min(u16::MAX as usize);
        dst.put_u16(len as u16);
        dst.put_slice(&self.as_bytes()[..len]);
    }

    fn decode_raknet(src: &mut impl Buf) -> Result<Self, DecodeError> {
        let len = u16::decode_raknet(src)? as usize;
        if src.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        let mut raw = vec![0u8; len];
        src.copy_to_slice(&mut raw);
        String::from_utf8(raw).map_err(|_| DecodeError::InvalidString)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RaknetTime(pub u64); // ms on wire

impl RaknetEncodable for RaknetTime {
    fn encode_raknet(&self, dst: &mut impl BufMut) {
        self.0.encode_raknet(dst);
    }

    fn decode_raknet(src: &mut impl Buf) -> Result<Self, DecodeError> {
        Ok(Self(u64::decode_raknet(src)?))
    }
}

impl From<RaknetTime> for Duration {
    fn from(value: RaknetTime) -> Self {
        Duration::from_millis(value.0)
    }
}

impl From<Duration> for RaknetTime {
    fn from(value: Duration) -> Self {
        RaknetTime(value.as_millis() as u64)
    }
}

/// End of Buffer Padding, adds any length padding till the
/// end of it. So doesn't send any prepadding length or etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EoBPadding(pub usize);

impl RaknetEncodable for EoBPadding {
    fn encode_raknet(&self, dst: &mut impl BufMut) {
        dst.put_bytes(0, self.0);
    }

    fn decode_raknet(src: &mut impl Buf) -> Result<Self, DecodeError> {
        let len = src.remaining();
        src.advance(len);
        Ok(EoBPadding(len))
    }
}

impl RaknetEncodable for SocketAddr {
    fn encode_raknet(&self, dst: &mut impl BufMut) {
        match self {
            SocketAddr::V4(addr) => {
                dst.put_u8(4);
                // IPv4 octets travel bitwise inverted.
                let ip = addr.ip().octets();
                dst.put_slice(&[!ip[0], !ip[1], !ip[2], !ip[3]]);
                dst.put_u16(addr.port());
            }
            SocketAddr::V6(addr) => {
                dst.put_u8(6);
                // sockaddr_in6 layout: family, port, flowinfo, addr, scope.
                dst.put_u16_le(23);
                dst.put_u16(addr.port());
                dst.put_u32(addr.flowinfo());
                dst.put_slice(&addr.ip().octets());
                dst.put_u32(addr.scope_id());
            }
        }
    }

    fn decode_raknet(src: &mut impl Buf) -> Result<Self, DecodeError> {
        let version = u8::decode_raknet(src)?;

        match version {
            4 => {
                if src.remaining() < 4 + 2 {
                    return Err(DecodeError::UnexpectedEof);
                }
                let mut ip = [0u8; 4];
                src.copy_to_slice(&mut ip);
                let port = src.get_u16();
                Ok(SocketAddr::V4(SocketAddrV4::new(
                    Ipv4Addr::from([!ip[0], !ip[1], !ip[2], !ip[3]]),
                    port,
                )))
            }
            6 => {
                if src.remaining() < 2 + 2 + 4 + 16 + 4 {
                    return Err(DecodeError::UnexpectedEof);
                }
                let _family = src.get_u16_le();
                let port = src.get_u16();
                let flowinfo = src.get_u32();
                let mut ip = [0u8; 16];
                src.copy_to_slice(&mut ip);
                let scope_id = src.get_u32();

                Ok(SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(ip),
                    port,
                    flowinfo,
                    scope_id,
                )))
            }
            other => Err(DecodeError::InvalidAddrVersion(other)),
        }
    }
}
