use std::cmp::Ordering;
use std::ops::Add;

use crate::protocol::{packet::RaknetEncodable, types::U24LE};

const MODULO: u32 = 1 << 24;
const MASK: u32 = MODULO - 1;
const HALF: u32 = MODULO / 2;

/// Wrapping 24-bit counter used for datagram sequence numbers,
/// reliable message indexes and order indexes.
///
/// Ordering is wrap-aware: a value is "greater" when it lies less than
/// half the sequence space ahead of the other.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct Sequence24(u32);

impl Sequence24 {
    pub const ZERO: Sequence24 = Sequence24(0);

    pub fn new(v: u32) -> Sequence24 {
        Sequence24(v & MASK)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn next(&self) -> Sequence24 {
        Sequence24::new(self.0.wrapping_add(1))
    }

    pub fn prev(&self) -> Sequence24 {
        Sequence24(if self.0 == 0 { MASK } else { self.0 - 1 })
    }

    /// Forward distance from `earlier` to `self`, modulo 2^24.
    pub fn distance_from(&self, earlier: Sequence24) -> u32 {
        self.0.wrapping_sub(earlier.0) & MASK
    }
}

impl Ord for Sequence24 {
    fn cmp(&self, other: &Self) -> Ordering {
        let d = self.distance_from(*other);
        if d == 0 {
            Ordering::Equal
        } else if d < HALF {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    }
}

impl PartialOrd for Sequence24 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add<u32> for Sequence24 {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Sequence24::new(self.0.wrapping_add(rhs))
    }
}

impl From<Sequence24> for U24LE {
    fn from(seq: Sequence24) -> Self {
        U24LE(seq.value())
    }
}

impl From<U24LE> for Sequence24 {
    fn from(raw: U24LE) -> Self {
        Sequence24::new(raw.0)
    }
}

impl RaknetEncodable for Sequence24 {
    fn encode_raknet(&self, dst: &mut impl bytes::BufMut) {
        U24LE::from(*self).encode_raknet(dst);
    }

    fn decode_raknet(
        src: &mut impl bytes::Buf,
    ) -> Result<Self, crate::protocol::packet::DecodeError> {
        Ok(Sequence24::from(U24LE::decode_raknet(src)?))
    }
}
