use crate::protocol::packet::DecodeError;

/// Delivery mode of an encapsulated packet, carried in the top three bits
/// of its flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reliability {
    Unreliable = 0,
    UnreliableSequenced = 1,
    Reliable = 2,
    ReliableOrdered = 3,
    ReliableSequenced = 4,
    UnreliableWithAckReceipt = 5,
    ReliableWithAckReceipt = 6,
    ReliableOrderedWithAckReceipt = 7,
}

impl Reliability {
    pub const ALL: [Reliability; 8] = [
        Reliability::Unreliable,
        Reliability::UnreliableSequenced,
        Reliability::Reliable,
        Reliability::ReliableOrdered,
        Reliability::ReliableSequenced,
        Reliability::UnreliableWithAckReceipt,
        Reliability::ReliableWithAckReceipt,
        Reliability::ReliableOrderedWithAckReceipt,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self, DecodeError> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(DecodeError::UnknownReliability(code))
    }

    /// Retransmitted until acknowledged; carries a message index.
    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            Reliability::Reliable
                | Reliability::ReliableOrdered
                | Reliability::ReliableSequenced
                | Reliability::ReliableWithAckReceipt
                | Reliability::ReliableOrderedWithAckReceipt
        )
    }

    /// Delivered in send order per channel.
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            Reliability::ReliableOrdered | Reliability::ReliableOrderedWithAckReceipt
        )
    }

    /// Stale messages on the channel are dropped instead of queued.
    pub fn is_sequenced(self) -> bool {
        matches!(
            self,
            Reliability::UnreliableSequenced | Reliability::ReliableSequenced
        )
    }

    /// Carries order index and channel on the wire.
    pub fn has_order_info(self) -> bool {
        self.is_ordered() || self.is_sequenced()
    }
}

impl TryFrom<u8> for Reliability {
    type Error = DecodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Reliability::from_code(code)
    }
}
