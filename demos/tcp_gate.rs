//! Gate raw TCP connections by peer IP.
//!
//! Run with `cargo run --example tcp_gate`, then hammer it with
//! `for i in $(seq 10); do nc -z 127.0.0.1 7070; done`. Connections over the
//! limit are closed immediately without being handed to the echo task.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tollgate::{Limit, LimiterConfig, RateLimiter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(true).init();

    let config = LimiterConfig::builder()
        .limit(Limit::new(2.0, 5)?)
        .cleanup_interval(Duration::from_secs(60))
        .stale_ttl(Duration::from_secs(300))
        .build()?;
    let limiter = RateLimiter::with_config(config);

    let listener = TcpListener::bind("127.0.0.1:7070").await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let principal = peer.ip().to_string();
        if !limiter.allow(&principal) {
            // Dropping the socket closes it.
            drop(socket);
            continue;
        }

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 || socket.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        });
    }
}
