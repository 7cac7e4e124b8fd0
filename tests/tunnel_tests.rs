mod common;

use common::{echo_through, random_payload, start_echo_server, start_tunnel};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tunnel_relay::{RelayConfig, RelayStatsTracker, Side};

fn relay_config(body: &str) -> RelayConfig {
    RelayConfig::from_toml_str(body).expect("valid test configuration")
}

async fn wait_for_idle(stats: &RelayStatsTracker, sessions: u64) {
    for _ in 0..100 {
        let snapshot = stats.get_stats();
        if snapshot.total_sessions >= sessions && snapshot.active_sessions == 0 {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("sessions did not finish: {:?}", stats.get_stats());
}

async fn assert_echo_round_trip(config: &RelayConfig, payload_len: usize) {
    let (echo_addr, echo_handle) = start_echo_server().await;
    let server = start_tunnel(config, Side::Bridge, echo_addr).await;
    let client = start_tunnel(config, Side::Peer, server.addr).await;

    let payload = random_payload(payload_len);
    let response = echo_through(client.addr, &payload, Duration::from_secs(10))
        .await
        .expect("echo through tunnel");
    assert_eq!(response.len(), payload.len());
    assert!(response == payload, "echoed payload mismatch");

    wait_for_idle(&client.stats, 1).await;
    let stats = client.stats.get_stats();
    assert_eq!(stats.bytes_peer_to_bridge, payload_len as u64);

    client.shutdown.send(()).unwrap();
    server.shutdown.send(()).unwrap();
    client.handle.await.unwrap().unwrap();
    server.handle.await.unwrap().unwrap();
    echo_handle.abort();
}

#[tokio::test]
async fn test_plain_tunnel_echo() {
    let config = relay_config(
        r#"
        [relay]
        compress = ""
        "#,
    );
    assert_echo_round_trip(&config, 64 * 1024).await;
}

#[tokio::test]
async fn test_encrypted_snappy_tunnel_echo() {
    let config = relay_config(
        r#"
        [relay]
        compress = "snappy"
        crypt = true
        crypt_key = "integration-test-secret-key"
        buffer_size = 8192
        pool_capacity = 16
        keepalive_secs = 60
        "#,
    );
    assert_echo_round_trip(&config, 512 * 1024 + 3).await;
}

#[tokio::test]
async fn test_rate_limited_tunnel_echo() {
    let config = relay_config(
        r#"
        [relay]
        compress = "snappy"

        [rate_limit]
        bytes_per_second = 4194304
        burst_bytes = 65536
        "#,
    );
    assert_echo_round_trip(&config, 128 * 1024).await;
}

#[tokio::test]
async fn test_unreachable_target_closes_connection() {
    // 绑定后立即释放，得到一个没有监听者的地址
    let dead_addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let config = relay_config(
        r#"
        [relay]
        flush_timeout_ms = 100
        "#,
    );
    let client = start_tunnel(&config, Side::Peer, dead_addr).await;

    let mut stream = TcpStream::connect(client.addr).await.unwrap();
    let _ = stream.write_all(b"hello").await;

    let mut buf = [0u8; 16];
    let result = timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("connection should be closed by the tunnel");
    assert!(matches!(result, Ok(0) | Err(_)));

    let stats = client.stats.get_stats();
    assert_eq!(stats.total_sessions, 0);

    client.shutdown.send(()).unwrap();
    client.handle.await.unwrap().unwrap();
}
