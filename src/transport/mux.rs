use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{Interval, MissedTickBehavior, interval};

use crate::session::{Session, SessionTable};

pub(crate) fn new_tick_interval(period: Duration) -> Interval {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}

/// Sends everything the table has queued.
pub(crate) async fn flush_table(socket: &UdpSocket, table: &mut SessionTable) {
    let pending: Vec<_> = table.drain_outgoing().collect();
    for (peer, bytes) in pending {
        if let Err(e) = socket.send_to(&bytes, peer).await {
            tracing::error!(peer = %peer, error = %e, "UDP send failed");
        }
    }
}

/// Sends everything a connected-socket session has queued.
pub(crate) async fn flush_session(socket: &UdpSocket, session: &mut Session) {
    let pending: Vec<_> = session.drain_outgoing().collect();
    for bytes in pending {
        if let Err(e) = socket.send(&bytes).await {
            tracing::error!(peer = %session.remote_addr(), error = %e, "UDP send failed");
        }
    }
}

/// ICMP port-unreachable surfaces as a reset on some platforms.
pub(crate) fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionRefused
    )
}
