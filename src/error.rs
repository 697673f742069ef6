use thiserror::Error;

use crate::protocol::{packet::DecodeError, state::DisconnectReason};

/// Errors surfaced by sessions and the transport built on them.
#[derive(Error, Debug)]
pub enum RaknetError {
    #[error("Malformed datagram: {0}")]
    Decode(#[from] DecodeError),

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session disconnected: {0}")]
    Disconnected(DisconnectReason),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Payload is empty; it must start with a message id")]
    EmptyPayload,

    #[error("Ordering channel {0} out of range")]
    InvalidChannel(u8),

    #[error("Too many concurrent split messages (limit {limit})")]
    SplitLimitExceeded { limit: usize },

    #[error("Split count {count} exceeds limit {limit}")]
    SplitCountTooLarge { count: u32, limit: u32 },

    #[error("Retransmission queue holds {len} datagrams (limit {limit})")]
    QueueTooLong { len: usize, limit: usize },

    #[error("Ordering channel {channel} buffers more than {limit} messages")]
    OrderingBufferFull { channel: u8, limit: usize },

    #[error("No MTU at or above {floor} was answered")]
    MtuDiscoveryFailed { floor: u16 },

    #[error("Handshake did not complete in time")]
    HandshakeTimedOut,

    #[error("Payload of {len} bytes needs more than {limit} fragments")]
    PayloadTooLarge { len: usize, limit: u32 },
}

impl RaknetError {
    /// Whether the error has torn the session down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RaknetError::Disconnected(_)
                | RaknetError::ConnectionClosed
                | RaknetError::SplitLimitExceeded { .. }
                | RaknetError::SplitCountTooLarge { .. }
                | RaknetError::QueueTooLong { .. }
                | RaknetError::OrderingBufferFull { .. }
                | RaknetError::MtuDiscoveryFailed { .. }
                | RaknetError::HandshakeTimedOut
        )
    }

    /// Reason recorded on the session when this error closes it.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            RaknetError::Disconnected(reason) => Some(*reason),
            RaknetError::SplitLimitExceeded { .. } | RaknetError::SplitCountTooLarge { .. } => {
                Some(DisconnectReason::SplitLimitExceeded)
            }
            RaknetError::QueueTooLong { .. } | RaknetError::OrderingBufferFull { .. } => {
                Some(DisconnectReason::QueueTooLong)
            }
            RaknetError::MtuDiscoveryFailed { .. } => Some(DisconnectReason::MtuNegotiationFailed),
            RaknetError::HandshakeTimedOut => Some(DisconnectReason::TimedOut),
            _ => None,
        }
    }
}
