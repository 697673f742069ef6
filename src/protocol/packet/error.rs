use bytes::Bytes;
use thiserror::Error;

/// Errors that may occur while decoding RakNet protocol values or packets.
///
/// This type is kept small and generic so it can be shared by all
/// `RaknetEncodable` implementations and packet bodies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer did not contain enough bytes to decode the requested value.
    #[error("Unexpected EoF, not enough bytes to read requested type.")]
    UnexpectedEof,

    /// A control packet ID was not recognised by the registry.
    #[error("Unknown Packet, ID: {0}")]
    UnknownId(u8),

    /// A specific packet was required but another one was found.
    #[error("Unexpected packet ID: expected 0x{expected:02x}, found 0x{found:02x}")]
    UnexpectedId { expected: u8, found: u8 },

    /// Wrapper for packets that are considered legacy/unsupported.
    #[error(
        "An unimplemented / legacy packet encountered. \
        Packet ID: {id}"
    )]
    UnimplementedPacket { id: u8, payload: Bytes },

    /// An address encoding used an unsupported version field.
    #[error(
        "An invalid IpAddress version was encountered:\n\
        Provided: {0}, expected: 4 or 6."
    )]
    InvalidAddrVersion(u8),

    #[error("An unknown reliability value was provided. Reliability byte: {0}")]
    UnknownReliability(u8),

    /// Split descriptor with a zero count or an index outside the count.
    #[error("Invalid split descriptor: index {index} of count {count}")]
    InvalidSplit { index: u32, count: u32 },

    #[error("Ordering channel {0} out of range")]
    InvalidChannel(u8),

    #[error("Length-prefixed string is not valid UTF-8")]
    InvalidString,
}
