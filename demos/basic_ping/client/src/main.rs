use std::error::Error;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use raknet_session::transport::{Message, RaknetClient};
use raknet_session::{Reliability, SessionConfig};

const PING_ID: u8 = 0xFE;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let server: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:19132".to_string())
        .parse()?;

    let mut client = RaknetClient::connect(server, SessionConfig::default()).await?;
    println!("Connected to {} (mtu {})", server, client.mtu());

    for n in 0..5u32 {
        let mut buf = BytesMut::with_capacity(5);
        buf.put_u8(PING_ID);
        buf.put_u32(n);
        let sent = Instant::now();
        client
            .send(Message::new(buf.freeze()).reliability(Reliability::ReliableOrdered))
            .await?;

        match tokio::time::timeout(Duration::from_secs(2), client.recv()).await {
            Ok(Some(Ok(reply))) => println!("reply {} ({} bytes) in {:?}", n, reply.len(), sent.elapsed()),
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => break,
            Err(_) => println!("reply {} timed out", n),
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    client.disconnect().await?;
    Ok(())
}
