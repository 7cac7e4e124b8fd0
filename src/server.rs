use crate::config::RelayConfig;
use crate::tunnel::{Side, Tunnel};
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

/// 运行服务器：在 `server.listen` 接受编码流量，转发到明文目标 `server.target`
pub async fn run_server(config: RelayConfig) -> Result<()> {
    let section = config
        .server
        .clone()
        .context("Missing [server] section in configuration")?;

    let tunnel = Tunnel::new(&config, "server", Side::Bridge, section.target.as_str())?;
    let listener = TcpListener::bind(&section.listen)
        .await
        .with_context(|| format!("Failed to bind {}", section.listen))?;

    info!("Relay server started (Press Ctrl+C to stop)");
    tunnel.serve(listener, tokio::signal::ctrl_c()).await
}
