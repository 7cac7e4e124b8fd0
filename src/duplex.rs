/// 双向中继会话
///
/// bridge → peer 方向在新任务中运行，peer → bridge 方向在调用者任务中运行，
/// 等待两个方向都结束后返回。一个方向结束不会取消另一个方向：
/// 仍在运行的方向只会因为自身源端 EOF 或出错而结束，
/// 通常是另一方向的关闭流程关掉了共享连接
use crate::conn::SharedConnection;
use crate::copy::Transfer;
use crate::error::RelayError;
use crate::mode::ModePair;
use crate::relay::{relay, RelayOptions};
use crate::stats::{RelayStatsTracker, SessionGuard};
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

/// 会话结束后的统计
#[derive(Debug)]
pub struct DuplexReport {
    /// bridge → peer（encode 方向，新任务中运行）的字节数
    pub bridge_to_peer: u64,
    /// peer → bridge（decode 方向，调用者任务中运行）的字节数
    pub peer_to_bridge: u64,
    /// 调用者任务所在方向的错误；新任务方向的错误不会上报
    pub error: Option<RelayError>,
}

/// 一个隧道流的两端及其中继参数
pub struct DuplexSession {
    bridge: SharedConnection,
    peer: SharedConnection,
    modes: ModePair,
    options: RelayOptions,
    stats: Option<RelayStatsTracker>,
}

impl DuplexSession {
    pub fn new(
        bridge: SharedConnection,
        peer: SharedConnection,
        modes: ModePair,
        options: RelayOptions,
    ) -> Self {
        Self {
            bridge,
            peer,
            modes,
            options,
            stats: None,
        }
    }

    /// 附加统计跟踪器
    pub fn with_stats(mut self, tracker: RelayStatsTracker) -> Self {
        self.stats = Some(tracker);
        self
    }

    /// 运行两个方向直到都结束
    pub async fn run(self) -> DuplexReport {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("session", %id);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> DuplexReport {
        let _guard = self.stats.clone().map(SessionGuard::new);
        debug!(
            "Session started (encode: {}, decode: {}, mux: {})",
            self.modes.encode, self.modes.decode, self.options.mux
        );

        let forward = {
            let bridge = self.bridge.clone();
            let peer = self.peer.clone();
            let options = self.options.clone();
            let mode = self.modes.encode;
            tokio::spawn(
                async move { relay(&bridge, &peer, mode, &options).await }
                    .in_current_span(),
            )
        };

        let reverse: Transfer =
            relay(&self.peer, &self.bridge, self.modes.decode, &self.options).await;

        let bridge_to_peer = match forward.await {
            Ok(transfer) => {
                if let Some(e) = &transfer.error {
                    debug!("Bridge to peer direction ended with error: {}", e);
                }
                transfer.bytes
            }
            Err(e) => {
                error!("Bridge to peer task failed: {}", e);
                0
            }
        };

        if let Some(tracker) = &self.stats {
            tracker.add_bytes(bridge_to_peer, reverse.bytes);
        }

        info!(
            "Session closed: bridge->peer {} bytes, peer->bridge {} bytes",
            bridge_to_peer, reverse.bytes
        );

        DuplexReport {
            bridge_to_peer,
            peer_to_bridge: reverse.bytes,
            error: reverse.error,
        }
    }
}
