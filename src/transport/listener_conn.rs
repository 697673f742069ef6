use bytes::Bytes;
use std::net::SocketAddr;
use tokio::sync::mpsc;

use crate::transport::{Incoming, Message, OutboundMsg};

/// Server-side connection handle returned from `RaknetListener::accept`.
pub struct RaknetConnection {
    peer: SocketAddr,
    incoming: mpsc::Receiver<Incoming>,
    outbound_tx: mpsc::Sender<OutboundMsg>,
}

impl RaknetConnection {
    pub(crate) fn new(
        peer: SocketAddr,
        incoming: mpsc::Receiver<Incoming>,
        outbound_tx: mpsc::Sender<OutboundMsg>,
    ) -> Self {
        Self {
            peer,
            incoming,
            outbound_tx,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Next payload from the peer. After the session ends this yields one
    /// `Err` carrying the reason, then `None`.
    pub async fn recv(&mut self) -> Option<Result<Bytes, crate::RaknetError>> {
        self.incoming.recv().await
    }

    pub async fn send(&self, msg: impl Into<Message>) -> Result<(), crate::RaknetError> {
        let message = msg.into();
        if message.buffer.is_empty() {
            return Ok(());
        }
        self.outbound_tx
            .send(OutboundMsg::Send {
                peer: self.peer,
                message,
            })
            .await
            .map_err(|_| crate::RaknetError::ConnectionClosed)
    }

    /// Sends a disconnect notification and closes the session.
    pub async fn disconnect(self) -> Result<(), crate::RaknetError> {
        self.outbound_tx
            .send(OutboundMsg::Disconnect { peer: self.peer })
            .await
            .map_err(|_| crate::RaknetError::ConnectionClosed)
    }
}
