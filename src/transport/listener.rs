use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::protocol::constants::UDP_HEADER_SIZE;
use crate::session::{SessionConfig, SessionEvent, SessionTable};
use crate::transport::listener_conn::RaknetConnection;
use crate::transport::mux::{flush_table, is_transient, new_tick_interval};

use super::{Incoming, OutboundMsg};

pub const MAX_PENDING_CONNECTIONS: usize = 1024;

const CONNECTION_BUFFER: usize = 128;

type NewConnection = (SocketAddr, mpsc::Receiver<Incoming>);

/// Server-side RakNet listener that accepts new connections.
pub struct RaknetListener {
    local_addr: SocketAddr,
    guid: u64,
    new_connections: mpsc::Receiver<NewConnection>,
    outbound_tx: mpsc::Sender<OutboundMsg>,
}

impl RaknetListener {
    /// Binds a new listener to the specified address.
    pub async fn bind(addr: SocketAddr, config: SessionConfig) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;

        let table = SessionTable::new(local_addr, Arc::new(config));
        let guid = table.guid();

        let (new_conn_tx, new_conn_rx) = mpsc::channel(MAX_PENDING_CONNECTIONS);
        let (outbound_tx, outbound_rx) = mpsc::channel(1024);

        tokio::spawn(run_listener_muxer(socket, table, new_conn_tx, outbound_rx));

        Ok(Self {
            local_addr,
            guid,
            new_connections: new_conn_rx,
            outbound_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Identifier announced to connecting peers.
    pub fn guid(&self) -> u64 {
        self.guid
    }

    /// Accepts the next connection that completed the handshake.
    pub async fn accept(&mut self) -> Option<RaknetConnection> {
        let (peer, incoming) = self.new_connections.recv().await?;
        Some(RaknetConnection::new(
            peer,
            incoming,
            self.outbound_tx.clone(),
        ))
    }
}

async fn run_listener_muxer(
    socket: UdpSocket,
    mut table: SessionTable,
    new_conn_tx: mpsc::Sender<NewConnection>,
    mut outbound_rx: mpsc::Receiver<OutboundMsg>,
) {
    let mut buf = vec![0u8; table.config().mtu_ceiling() as usize + UDP_HEADER_SIZE + 64];
    let mut peers: HashMap<SocketAddr, mpsc::Sender<Incoming>> = HashMap::new();
    let mut tick = new_tick_interval(table.config().tick_interval);

    loop {
        tokio::select! {
            res = socket.recv_from(&mut buf) => {
                match res {
                    Ok((len, peer)) => {
                        // errors are logged by the table and scoped to the datagram
                        let _ = table.handle_datagram(peer, &buf[..len], Instant::now());
                    }
                    Err(e) if is_transient(&e) => continue,
                    Err(e) => {
                        tracing::error!("UDP socket error: {}", e);
                        continue;
                    }
                }
            }

            msg = outbound_rx.recv() => {
                let Some(msg) = msg else {
                    tracing::debug!(local = %table.local_addr(), "all handles dropped, stopping listener");
                    break;
                };
                handle_outgoing_msg(&mut table, msg);
            }

            _ = tick.tick() => {
                table.tick(Instant::now());
            }
        }

        // dispatching may disconnect peers, so flush afterwards
        dispatch_events(&mut table, &mut peers, &new_conn_tx);
        flush_table(&socket, &mut table).await;
    }
}

fn handle_outgoing_msg(table: &mut SessionTable, msg: OutboundMsg) {
    let now = Instant::now();
    match msg {
        OutboundMsg::Send { peer, message } => {
            if let Err(e) = table.send(
                peer,
                message.buffer,
                message.reliability,
                message.channel,
                now,
            ) {
                tracing::debug!(peer = %peer, error = %e, "outbound dropped");
            }
        }
        OutboundMsg::Disconnect { peer } => {
            table.disconnect(peer, now);
        }
    }
}

/// Hands session events to connection handles without waiting on them, so
/// one slow reader cannot stall the socket.
fn dispatch_events(
    table: &mut SessionTable,
    peers: &mut HashMap<SocketAddr, mpsc::Sender<Incoming>>,
    new_conn_tx: &mpsc::Sender<NewConnection>,
) {
    while let Some((peer, event)) = table.poll_event() {
        match event {
            SessionEvent::Connected => {
                let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
                match new_conn_tx.try_send((peer, rx)) {
                    Ok(()) => {
                        peers.insert(peer, tx);
                    }
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(peer = %peer, "accept backlog full, disconnecting");
                        table.disconnect(peer, Instant::now());
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(peer = %peer, "listener dropped, connection not announced");
                        table.disconnect(peer, Instant::now());
                    }
                }
            }
            SessionEvent::Message(payload) => {
                let Some(tx) = peers.get(&peer) else {
                    continue;
                };
                match tx.try_send(Ok(payload)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(peer = %peer, "connection handle not reading, message dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::trace!(peer = %peer, "connection handle dropped");
                    }
                }
            }
            SessionEvent::Disconnected(reason) => {
                if let Some(tx) = peers.remove(&peer)
                    && tx.try_send(Err(crate::RaknetError::Disconnected(reason))).is_err()
                {
                    tracing::debug!(peer = %peer, %reason, "disconnect not delivered to handle");
                }
            }
            SessionEvent::LatencyUpdated(latency) => {
                tracing::trace!(peer = %peer, ?latency, "latency");
            }
        }
    }
}
