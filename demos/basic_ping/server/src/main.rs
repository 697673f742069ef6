use std::error::Error;
use std::net::SocketAddr;

use raknet_session::SessionConfig;
use raknet_session::transport::{Message, RaknetConnection, RaknetListener};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let bind_addr: SocketAddr = "0.0.0.0:19132".parse()?;
    let mut listener = RaknetListener::bind(bind_addr, SessionConfig::default()).await?;
    println!("Listening on {}", listener.local_addr());

    while let Some(conn) = listener.accept().await {
        tokio::spawn(echo(conn));
    }
    Ok(())
}

async fn echo(mut conn: RaknetConnection) {
    let peer = conn.peer_addr();
    println!("[{}] connected", peer);

    while let Some(res) = conn.recv().await {
        match res {
            Ok(payload) => {
                println!("[{}] {} bytes", peer, payload.len());
                if conn.send(Message::new(payload)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                println!("[{}] {}", peer, e);
                break;
            }
        }
    }
}
