use std::fmt;

/// Lifecycle of a session. Transitions only move forward; a closed session
/// is discarded, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SessionState {
    Disconnected,
    ConnectingPhase1,
    ConnectingPhase2,
    Handshaking,
    Connected,
}

/// Which side of the handshake a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DisconnectReason {
    ClosedByRemotePeer,
    Disconnected,
    TimedOut,
    IncompatibleProtocolVersion,
    MtuNegotiationFailed,
    BadPacket,
    SplitLimitExceeded,
    QueueTooLong,
}

impl DisconnectReason {
    /// Abuse-driven closes; the session table may block the address.
    pub fn is_abuse(self) -> bool {
        matches!(
            self,
            DisconnectReason::BadPacket
                | DisconnectReason::SplitLimitExceeded
                | DisconnectReason::QueueTooLong
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::ClosedByRemotePeer => "closed by remote peer",
            DisconnectReason::Disconnected => "disconnected",
            DisconnectReason::TimedOut => "timed out",
            DisconnectReason::IncompatibleProtocolVersion => "incompatible protocol version",
            DisconnectReason::MtuNegotiationFailed => "mtu negotiation failed",
            DisconnectReason::BadPacket => "bad packet",
            DisconnectReason::SplitLimitExceeded => "split limit exceeded",
            DisconnectReason::QueueTooLong => "queue too long",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
