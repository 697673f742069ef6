use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::RaknetError;
use crate::protocol::constants::UDP_HEADER_SIZE;
use crate::session::{Session, SessionConfig, SessionEvent};
use crate::transport::mux::{flush_session, is_transient, new_tick_interval};

use super::{Incoming, Message, OutboundMsg};

const CLIENT_BUFFER: usize = 128;

/// Client-side RakNet connection over its own UDP socket.
pub struct RaknetClient {
    peer: SocketAddr,
    local_addr: SocketAddr,
    mtu: u16,
    incoming: mpsc::Receiver<Incoming>,
    outbound_tx: mpsc::Sender<OutboundMsg>,
}

impl RaknetClient {
    /// Connects to `server` and completes the handshake before returning.
    pub async fn connect(server: SocketAddr, config: SessionConfig) -> Result<Self, RaknetError> {
        let bind_addr: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(server).await?;
        let local_addr = socket.local_addr()?;

        let config = Arc::new(config);
        let mut buf = vec![0u8; config.mtu_ceiling() as usize + UDP_HEADER_SIZE + 64];
        let mut tick = new_tick_interval(config.tick_interval.min(config.connect_attempt_interval));
        let mut session = Session::connect(server, local_addr, config, Instant::now());
        let mut early = Vec::new();

        'handshake: loop {
            flush_session(&socket, &mut session).await;
            while let Some(event) = session.poll_event() {
                match event {
                    SessionEvent::Connected => {
                        early.extend(session.drain_events());
                        break 'handshake;
                    }
                    SessionEvent::Disconnected(reason) => {
                        return Err(RaknetError::Disconnected(reason));
                    }
                    other => early.push(other),
                }
            }

            tokio::select! {
                res = socket.recv(&mut buf) => match res {
                    Ok(len) => {
                        if let Err(e) = session.handle_datagram(&buf[..len], Instant::now()) {
                            tracing::debug!(peer = %server, error = %e, "handshake datagram rejected");
                        }
                    }
                    Err(e) if is_transient(&e) => {}
                    Err(e) => return Err(e.into()),
                },
                _ = tick.tick() => {
                    if let Err(e) = session.tick(Instant::now())
                        && e.is_fatal()
                    {
                        return Err(e);
                    }
                }
            }
        }

        tracing::info!(peer = %server, mtu = session.mtu(), "connected");
        let mtu = session.mtu();
        let (to_app, incoming) = mpsc::channel(CLIENT_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel(1024);
        for event in early {
            forward_event(&to_app, event).await;
        }
        tokio::spawn(run_client_muxer(socket, session, buf, to_app, outbound_rx));

        Ok(Self {
            peer: server,
            local_addr,
            mtu,
            incoming,
            outbound_tx,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// MTU agreed during the handshake.
    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Next payload from the server. After the session ends this yields one
    /// `Err` carrying the reason, then `None`.
    pub async fn recv(&mut self) -> Option<Result<Bytes, RaknetError>> {
        self.incoming.recv().await
    }

    pub async fn send(&self, msg: impl Into<Message>) -> Result<(), RaknetError> {
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
            .map_err(|_| RaknetError::ConnectionClosed)
    }

    pub async fn disconnect(self) -> Result<(), RaknetError> {
        self.outbound_tx
            .send(OutboundMsg::Disconnect { peer: self.peer })
            .await
            .map_err(|_| RaknetError::ConnectionClosed)
    }
}

async fn forward_event(to_app: &mpsc::Sender<Incoming>, event: SessionEvent) {
    let item = match event {
        SessionEvent::Message(payload) => Ok(payload),
        SessionEvent::Disconnected(reason) => Err(RaknetError::Disconnected(reason)),
        SessionEvent::Connected | SessionEvent::LatencyUpdated(_) => return,
    };
    let _ = to_app.send(item).await;
}

async fn run_client_muxer(
    socket: UdpSocket,
    mut session: Session,
    mut buf: Vec<u8>,
    to_app: mpsc::Sender<Incoming>,
    mut outbound_rx: mpsc::Receiver<OutboundMsg>,
) {
    let mut tick = new_tick_interval(session.config().tick_interval);

    while !session.is_closed() {
        tokio::select! {
            res = socket.recv(&mut buf) => match res {
                Ok(len) => {
                    if let Err(e) = session.handle_datagram(&buf[..len], Instant::now()) {
                        tracing::debug!(peer = %session.remote_addr(), error = %e, "datagram rejected");
                    }
                }
                Err(e) if is_transient(&e) => {}
                Err(e) => tracing::error!("UDP socket error: {}", e),
            },

            msg = outbound_rx.recv() => match msg {
                Some(OutboundMsg::Send { message, .. }) => {
                    if let Err(e) = session.send(
                        message.buffer,
                        message.reliability,
                        message.channel,
                        Instant::now(),
                    ) {
                        tracing::debug!(peer = %session.remote_addr(), error = %e, "outbound dropped");
                    }
                }
                Some(OutboundMsg::Disconnect { .. }) | None => session.disconnect(Instant::now()),
            },

            _ = tick.tick() => {
                if let Err(e) = session.tick(Instant::now()) {
                    tracing::debug!(peer = %session.remote_addr(), error = %e, "tick");
                }
            }
        }

        flush_session(&socket, &mut session).await;
        let events: Vec<_> = session.drain_events().collect();
        for event in events {
            if let SessionEvent::LatencyUpdated(latency) = event {
                tracing::trace!(peer = %session.remote_addr(), ?latency, "latency");
            }
            forward_event(&to_app, event).await;
        }
    }
    tracing::debug!(peer = %session.remote_addr(), reason = ?session.close_reason(), "client muxer stopped");
}
