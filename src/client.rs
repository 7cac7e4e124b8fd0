use crate::config::RelayConfig;
use crate::tunnel::{Side, Tunnel};
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

/// 运行客户端：在 `client.listen` 接受明文流量，编码后转发到 `client.remote`
pub async fn run_client(config: RelayConfig) -> Result<()> {
    let section = config
        .client
        .clone()
        .context("Missing [client] section in configuration")?;

    let tunnel = Tunnel::new(&config, "client", Side::Peer, section.remote.as_str())?;
    let listener = TcpListener::bind(&section.listen)
        .await
        .with_context(|| format!("Failed to bind {}", section.listen))?;

    info!("Relay client started (Press Ctrl+C to stop)");
    tunnel.serve(listener, tokio::signal::ctrl_c()).await
}
