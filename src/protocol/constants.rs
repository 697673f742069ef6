use bitflags::bitflags;
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};

use crate::protocol::types::Magic;

pub const RAKNET_PROTOCOL_VERSION: u8 = 11; // Mojang's version.
pub const MINIMUM_MTU_SIZE: u16 = 576;
pub const MAXIMUM_MTU_SIZE: u16 = 1400;

/// Largest MTU a session will negotiate; the encapsulated length field
/// counts bits in 16 bits, so payloads must stay under 8 KiB.
pub const MTU_HARD_LIMIT: u16 = 1500;

/// Candidate sizes tried during MTU discovery, largest first.
pub const MTU_SIZES: &[u16] = &[MAXIMUM_MTU_SIZE, 1200, MINIMUM_MTU_SIZE];

/// Ordering channels carried by the 1-byte channel field.
pub const MAXIMUM_ORDERING_CHANNELS: u8 = 32;

/// IP + UDP header bytes not counted in a received datagram.
pub const UDP_HEADER_SIZE: usize = 28;

/// Flags byte + 3-byte sequence number.
pub const RAKNET_DATAGRAM_HEADER_SIZE: usize = 4;

pub const MAXIMUM_CONNECTION_ATTEMPTS: usize = 10;

/// Sends of one open-connection-request-1 size before stepping down.
pub const MTU_PROBE_ATTEMPTS: usize = 3;

/// Time between sending connection attempts.
pub const TIME_BETWEEN_SEND_CONNECTION_ATTEMPTS: Duration = Duration::from_millis(1000);

/// Time after which a session is closed due to no activity.
pub const SESSION_TIMEOUT: Duration = Duration::from_millis(10000);

/// Time after which a connected session is pinged to keep it alive.
pub const SESSION_STALE: Duration = Duration::from_millis(5000);

/// Unacknowledged reliable datagrams older than this are resent on tick.
pub const RESEND_INTERVAL: Duration = Duration::from_millis(1000);

/// Cadence of the periodic retransmission/keep-alive/timeout task.
pub const TICK_INTERVAL: Duration = Duration::from_millis(1000);

/// How long an abusive remote address stays blocked.
pub const ABUSE_BLOCK_DURATION: Duration = Duration::from_secs(10);

/// Upper bound of concurrently reassembling split ids per session.
pub const MAXIMUM_SPLIT_IDS: usize = 32;

/// Upper bound of fragments a single split message may announce.
pub const MAXIMUM_SPLIT_COUNT: u32 = 1024;

/// Upper bound of datagrams held in the recovery queue.
pub const MAXIMUM_QUEUED_DATAGRAMS: usize = 4096;

/// Upper bound of out-of-order messages buffered per ordering channel.
pub const MAXIMUM_ORDERING_BUFFER: usize = 1024;

/// Total sequence numbers a single ACK/NACK record may expand to.
pub const MAXIMUM_ACK_EXPANSION: usize = 4096;

/// Sequence numbers a single ACK/NACK range may expand to.
pub const MAXIMUM_ACK_RANGE: u32 = 512;

/// Received sequence numbers remembered behind the highest one seen.
pub const DUPLICATE_WINDOW: u32 = 1 << 15;

bitflags! {
    /// Represents all the flags for a RakNet datagram frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct DatagramFlags: u8 {
        const VALID            = 0b1000_0000;
        const ACK              = 0b0100_0000;

        // FLAG_NACK and FLAG_HAS_B_AND_AS are the same bit.
        const NACK             = 0b0010_0000;
        const HAS_B_AND_AS     = 0b0010_0000;

        const PACKET_PAIR      = 0b0001_0000;
        const CONTINUOUS_SEND  = 0b0000_1000;
        const NEEDS_B_AND_AS   = 0b0000_0100;

        const RELIABILITY_FLAGS = Self::ACK.bits() | Self::NACK.bits();
    }
}

impl DatagramFlags {
    /// Flags sent on every outgoing data datagram.
    pub const DATA: DatagramFlags = DatagramFlags::VALID.union(DatagramFlags::NEEDS_B_AND_AS);
    /// Leading byte of an ACK record.
    pub const ACK_RECORD: DatagramFlags = DatagramFlags::VALID.union(DatagramFlags::ACK);
    /// Leading byte of a NACK record.
    pub const NACK_RECORD: DatagramFlags = DatagramFlags::VALID.union(DatagramFlags::NACK);
}

/// Magic used to identify RakNet packets
pub const DEFAULT_UNCONNECTED_MAGIC: Magic = [
    0x00, 0xFF, 0xFF, 0x00, 0xFE, 0xFE, 0xFE, 0xFE, 0xFD, 0xFD, 0xFD, 0xFD, 0x12, 0x34, 0x56, 0x78,
];

pub const ANY_V4: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);

/// Placeholder internal addresses sent in the connection handshake.
pub const SYSTEM_ADDRESSES: [SocketAddr; 10] = [SocketAddr::V4(ANY_V4); 10];
