//! Growable byte buffer with independent read and write offsets.
//!
//! Writes append at the write position; reads consume from the read
//! position and can never pass what has been written. `Cursor` implements
//! [`Buf`] so every `RaknetEncodable` decoder can read straight from it.

use std::net::SocketAddr;

use bytes::{Buf, Bytes, BytesMut};

use crate::protocol::{
    packet::{DecodeError, RaknetEncodable},
    types::{Magic, U24LE},
};

#[derive(Debug, Clone, Default)]
pub struct Cursor {
    buf: BytesMut,
    read: usize,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            read: 0,
        }
    }

    pub fn read_position(&self) -> usize {
        self.read
    }

    pub fn write_position(&self) -> usize {
        self.buf.len()
    }

    /// Next unread byte without consuming it.
    pub fn peek_u8(&self) -> Option<u8> {
        self.buf.get(self.read).copied()
    }

    pub fn read<T: RaknetEncodable>(&mut self) -> Result<T, DecodeError> {
        T::decode_raknet(self)
    }

    pub fn write<T: RaknetEncodable>(&mut self, value: &T) -> &mut Self {
        value.encode_raknet(&mut self.buf);
        self
    }

    pub fn get_u8(&mut self) -> Result<u8, DecodeError> {
        self.read()
    }

    pub fn get_bool(&mut self) -> Result<bool, DecodeError> {
        self.read()
    }

    pub fn get_u16(&mut self) -> Result<u16, DecodeError> {
        self.read()
    }

    pub fn get_triad(&mut self) -> Result<u32, DecodeError> {
        Ok(self.read::<U24LE>()?.0)
    }

    pub fn get_u32(&mut self) -> Result<u32, DecodeError> {
        self.read()
    }

    pub fn get_u64(&mut self) -> Result<u64, DecodeError> {
        self.read()
    }

    pub fn get_magic(&mut self) -> Result<Magic, DecodeError> {
        self.read()
    }

    pub fn get_address(&mut self) -> Result<SocketAddr, DecodeError> {
        self.read()
    }

    pub fn get_string(&mut self) -> Result<String, DecodeError> {
        self.read()
    }

    /// Consumes exactly `len` bytes.
    pub fn get_span(&mut self, len: usize) -> Result<Bytes, DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        Ok(self.copy_to_bytes(len))
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.write(&v)
    }

    pub fn put_bool(&mut self, v: bool) -> &mut Self {
        self.write(&v)
    }

    pub fn put_u16(&mut self, v: u16) -> &mut Self {
        self.write(&v)
    }

    pub fn put_triad(&mut self, v: u32) -> &mut Self {
        self.write(&U24LE(v & 0x00FF_FFFF))
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.write(&v)
    }

    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        self.write(&v)
    }

    pub fn put_magic(&mut self, magic: &Magic) -> &mut Self {
        self.write(magic)
    }

    pub fn put_address(&mut self, addr: &SocketAddr) -> &mut Self {
        self.write(addr)
    }

    pub fn put_string(&mut self, s: &str) -> &mut Self {
        self.write(&s.to_owned())
    }

    pub fn put_span(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Mutable access to the written region, for encoders taking `BufMut`.
    pub fn writer(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Everything written so far, regardless of the read position.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

impl From<&[u8]> for Cursor {
    fn from(bytes: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(bytes),
            read: 0,
        }
    }
}

impl From<Bytes> for Cursor {
    fn from(bytes: Bytes) -> Self {
        Self {
            buf: BytesMut::from(&bytes[..]),
            read: 0,
        }
    }
}

impl Buf for Cursor {
    fn remaining(&self) -> usize {
        self.buf.len() - self.read
    }

    fn chunk(&self) -> &[u8] {
        &self.buf[self.read..]
    }

    fn advance(&mut self, cnt: usize) {
        assert!(cnt <= self.remaining(), "advance past write position");
        self.read += cnt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::DEFAULT_UNCONNECTED_MAGIC;

    #[test]
    fn typed_values_roundtrip_in_order() {
        let addr: SocketAddr = "10.0.0.7:19132".parse().unwrap();
        let mut cursor = Cursor::new();
        cursor
            .put_u8(0x05)
            .put_bool(true)
            .put_u16(1492)
            .put_triad(0xABCDEF)
            .put_u32(7)
            .put_u64(u64::MAX)
            .put_magic(&DEFAULT_UNCONNECTED_MAGIC)
            .put_address(&addr)
            .put_string("hello")
            .put_span(&[9, 9]);

        assert_eq!(cursor.get_u8().unwrap(), 0x05);
        assert!(cursor.get_bool().unwrap());
        assert_eq!(cursor.get_u16().unwrap(), 1492);
        assert_eq!(cursor.get_triad().unwrap(), 0xABCDEF);
        assert_eq!(cursor.get_u32().unwrap(), 7);
        assert_eq!(cursor.get_u64().unwrap(), u64::MAX);
        assert_eq!(cursor.get_magic().unwrap(), DEFAULT_UNCONNECTED_MAGIC);
        assert_eq!(cursor.get_address().unwrap(), addr);
        assert_eq!(cursor.get_string().unwrap(), "hello");
        assert_eq!(&cursor.get_span(2).unwrap()[..], &[9, 9]);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn reads_stop_at_write_position() {
        let mut cursor = Cursor::new();
        cursor.put_u16(0xBEEF);
        assert_eq!(cursor.get_u32(), Err(DecodeError::UnexpectedEof));
        // A failed read leaves the position untouched.
        assert_eq!(cursor.read_position(), 0);
        assert_eq!(cursor.get_u16().unwrap(), 0xBEEF);
        assert_eq!(cursor.get_u8(), Err(DecodeError::UnexpectedEof));
        assert_eq!(cursor.get_span(1), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn interleaved_reads_and_writes() {
        let mut cursor = Cursor::new();
        cursor.put_u8(1);
        assert_eq!(cursor.peek_u8(), Some(1));
        assert_eq!(cursor.get_u8().unwrap(), 1);
        assert_eq!(cursor.peek_u8(), None);
        cursor.put_u8(2);
        assert_eq!(cursor.get_u8().unwrap(), 2);
        assert_eq!(cursor.write_position(), 2);
        assert_eq!(cursor.read_position(), 2);
    }
}
