//! Tokio-based UDP transport for RakNet sessions.
//!
//! - `RaknetListener` / `RaknetConnection` for the responder side.
//! - `RaknetClient` for the initiator side.
//!
//! Every socket is owned by one muxer task that also owns the sessions
//! multiplexed over it; handles talk to that task through `mpsc` channels.
//! Protocol work (splitting, reliability, ordering, ACK/NACK) happens in the
//! `session` module.

use bytes::Bytes;
use std::net::SocketAddr;

use crate::protocol::reliability::Reliability;

pub mod client;
pub mod listener;
mod listener_conn;
mod mux;

pub use client::RaknetClient;
pub use listener::RaknetListener;
pub use listener_conn::RaknetConnection;

/// High-level message object for sending data.
/// Wraps the payload (id byte first) and its delivery options.
#[derive(Debug, Clone)]
pub struct Message {
    pub buffer: Bytes,
    pub reliability: Reliability,
    pub channel: u8,
}

impl Message {
    pub fn new(buffer: impl Into<Bytes>) -> Self {
        Self {
            buffer: buffer.into(),
            reliability: Reliability::ReliableOrdered,
            channel: 0,
        }
    }

    pub fn reliability(mut self, reliability: Reliability) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }
}

impl From<Bytes> for Message {
    fn from(buffer: Bytes) -> Self {
        Self::new(buffer)
    }
}

impl From<Vec<u8>> for Message {
    fn from(vec: Vec<u8>) -> Self {
        Self::new(vec)
    }
}

impl From<&'static [u8]> for Message {
    fn from(slice: &'static [u8]) -> Self {
        Self::new(Bytes::from(slice))
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::new(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self::new(Bytes::from(s))
    }
}

/// Request from a connection handle to its muxer task.
#[derive(Debug)]
pub(crate) enum OutboundMsg {
    Send { peer: SocketAddr, message: Message },
    Disconnect { peer: SocketAddr },
}

/// What a connection handle receives: payloads, then at most one error
/// describing why the session ended.
pub(crate) type Incoming = Result<Bytes, crate::RaknetError>;
