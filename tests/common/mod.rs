#![allow(dead_code)]
//! Common utilities for integration tests
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tunnel_relay::{
    ConnRead, RelayConfig, RelayStatsTracker, SharedConnection, Side, StreamConnection, Tunnel,
};

/// Connected in-memory connection pair
pub fn pipe() -> (SharedConnection, SharedConnection) {
    let (a, b) = StreamConnection::pipe(64 * 1024);
    (Arc::new(a), Arc::new(b))
}

/// Random, incompressible payload
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::rng().fill(&mut data[..]);
    data
}

/// Repeating pattern payload
pub fn pattern_payload(len: usize) -> Vec<u8> {
    b"0123456789abcdef".iter().copied().cycle().take(len).collect()
}

/// Read from a connection until EOF or error
pub async fn read_to_end<R: ConnRead + ?Sized>(src: &R) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; 16 * 1024];
    while let Ok(n) = src.read(&mut buf).await {
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

/// Read exactly `len` bytes, or fewer if the stream ends first
pub async fn read_exact_len<R: ConnRead + ?Sized>(src: &R, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut buf = vec![0u8; 16 * 1024];
    while out.len() < len {
        match src.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
        }
    }
    out
}

/// Create a simple echo server for testing
pub async fn start_echo_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind echo server");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        loop {
                            match socket.read(&mut buf).await {
                                Ok(0) => break, // Connection closed
                                Ok(n) => {
                                    if socket.write_all(&buf[..n]).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, handle)
}

/// A running tunnel listener, stopped when `shutdown` is sent
pub struct RunningTunnel {
    pub addr: SocketAddr,
    pub stats: RelayStatsTracker,
    pub shutdown: oneshot::Sender<()>,
    pub handle: JoinHandle<anyhow::Result<()>>,
}

/// Start a tunnel listener on an ephemeral port
pub async fn start_tunnel(
    config: &RelayConfig,
    side: Side,
    dial_addr: SocketAddr,
) -> RunningTunnel {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind tunnel listener");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let tunnel = Tunnel::new(config, "test", side, dial_addr.to_string())
        .expect("Failed to create tunnel");
    let stats = tunnel.stats().clone();
    let (shutdown, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(tunnel.serve(listener, rx));

    RunningTunnel {
        addr,
        stats,
        shutdown,
        handle,
    }
}

/// Test data transmission through proxy
pub async fn echo_through(
    addr: SocketAddr,
    test_data: &[u8],
    timeout_duration: Duration,
) -> Result<Vec<u8>, String> {
    timeout(timeout_duration, async {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| format!("Failed to connect to proxy: {}", e))?;

        let (mut reader, mut writer) = stream.split();
        let write = async {
            writer
                .write_all(test_data)
                .await
                .map_err(|e| format!("Failed to write data: {}", e))
        };
        let read = async {
            let mut response = Vec::new();
            let mut buf = vec![0u8; 8192];
            while response.len() < test_data.len() {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => response.extend_from_slice(&buf[..n]),
                    Err(e) => return Err(format!("Failed to read response: {}", e)),
                }
            }
            Ok(response)
        };

        let (written, response) = tokio::join!(write, read);
        written?;
        response
    })
    .await
    .map_err(|_| "Timeout waiting for response".to_string())?
}
