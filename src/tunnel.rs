/// 监听循环
///
/// 每个接受的 TCP 连接拨号到另一侧，然后在独立任务中运行一个双向中继会话。
/// server 模式接受的是桥接端，client 模式接受的是对端
use crate::config::RelayConfig;
use crate::conn::{Connection, StreamConnection};
use crate::duplex::DuplexSession;
use crate::mode::ModePair;
use crate::relay::RelayOptions;
use crate::reset::flush_connection_with_timeout;
use crate::stats::RelayStatsTracker;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// 接受的连接在隧道中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// 编码流量（桥接端）
    Bridge,
    /// 明文流量（对端）
    Peer,
}

/// 一个监听服务的全部运行参数
pub struct Tunnel {
    accepted: Side,
    dial_addr: String,
    modes: ModePair,
    options: RelayOptions,
    keepalive: Option<Duration>,
    flush_timeout: Duration,
    stats: RelayStatsTracker,
}

impl Tunnel {
    /// 根据配置创建服务，`accepted` 为监听端接受的一侧
    pub fn new(
        config: &RelayConfig,
        name: &str,
        accepted: Side,
        dial_addr: impl Into<String>,
    ) -> Result<Self> {
        let modes = config.modes()?;
        let pool = Arc::new(config.buffer_pool());
        let options = config.relay_options(pool)?;

        Ok(Self {
            accepted,
            dial_addr: dial_addr.into(),
            modes,
            options,
            keepalive: config.keepalive(),
            flush_timeout: config.flush_timeout(),
            stats: RelayStatsTracker::new(name),
        })
    }

    pub fn stats(&self) -> &RelayStatsTracker {
        &self.stats
    }

    /// 接受连接直到 `shutdown` 完成
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future,
    {
        let tunnel = Arc::new(self);
        let local = listener
            .local_addr()
            .context("Failed to get listener address")?;
        info!(
            "Listening on {} ({:?} side), forwarding to {} (encode: {}, decode: {})",
            local, tunnel.accepted, tunnel.dial_addr, tunnel.modes.encode, tunnel.modes.decode
        );

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("Accepted connection from {}", addr);
                            let tunnel = tunnel.clone();
                            tokio::spawn(async move {
                                if let Err(e) = tunnel.handle(stream, addr).await {
                                    error!("Connection {} error: {:#}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Received shutdown signal, stopping listener on {}", local);
                    break;
                }
            }
        }

        info!("Final stats: {}", tunnel.stats.to_json());
        Ok(())
    }

    async fn handle(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let accepted = StreamConnection::from_tcp(stream, self.keepalive);

        let dialed = match TcpStream::connect(&self.dial_addr).await {
            Ok(stream) => stream,
            Err(e) => {
                // 带着未读数据关闭会让对端收到 RST，先清空
                let drained =
                    flush_connection_with_timeout(&accepted, &self.options.pool, self.flush_timeout)
                        .await;
                debug!("Discarded {} bytes from {} before closing", drained, addr);
                if let Err(e) = accepted.close().await {
                    debug!("Failed to close {}: {}", addr, e);
                }
                return Err(e).with_context(|| format!("Failed to connect to {}", self.dial_addr));
            }
        };
        let dialed = StreamConnection::from_tcp(dialed, self.keepalive).into_shared();
        let accepted = accepted.into_shared();

        let (bridge, peer) = match self.accepted {
            Side::Bridge => (accepted, dialed),
            Side::Peer => (dialed, accepted),
        };

        let report = DuplexSession::new(bridge, peer, self.modes, self.options.clone())
            .with_stats(self.stats.clone())
            .run()
            .await;

        if let Some(e) = report.error {
            debug!("Session from {} ended with error: {}", addr, e);
        }
        info!("Stats: {}", self.stats.to_json());
        Ok(())
    }
}
