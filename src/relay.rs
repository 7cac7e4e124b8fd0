/// 单向中继
///
/// encode 模式包装源端（解码入站数据后输出明文），结束时关闭目标并向源端写入结束标记；
/// decode 模式包装目标端（编码出站明文），结束时关闭源端，非多路复用时同时关闭目标
use crate::buffer_pool::BufferPool;
use crate::conn::{ConnWrite, SharedConnection};
use crate::copy::{copy_buffer, Transfer};
use crate::crypto::SessionCipher;
use crate::mode::TransformMode;
use crate::rate_limiter::RateLimiter;
use crate::transform::{StreamTransform, END_OF_STREAM};
use std::sync::Arc;
use tracing::{debug, Instrument};

/// 中继参数，同一会话的两个方向共用
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// 加密器，None 表示不加密
    pub cipher: Option<SessionCipher>,
    /// 目标端是否为多路复用的共享连接
    pub mux: bool,
    /// 带宽限制，None 表示不限速
    pub rate: Option<RateLimiter>,
    /// 共享缓冲区池
    pub pool: Arc<BufferPool>,
}

impl RelayOptions {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            cipher: None,
            mux: false,
            rate: None,
            pool,
        }
    }

    pub fn with_cipher(mut self, cipher: Option<SessionCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_mux(mut self, mux: bool) -> Self {
        self.mux = mux;
        self
    }

    pub fn with_rate(mut self, rate: Option<RateLimiter>) -> Self {
        self.rate = rate;
        self
    }

    fn transform(&self, mode: TransformMode, conn: &SharedConnection) -> StreamTransform {
        StreamTransform::for_mode(mode, conn.clone(), self.cipher.clone(), self.rate.clone())
    }
}

/// 从 `src` 中继到 `dst`，执行该方向的关闭流程
///
/// 拷贝错误不重试，直接返回；关闭和结束标记的失败只记录日志
pub async fn relay(
    src: &SharedConnection,
    dst: &SharedConnection,
    mode: TransformMode,
    options: &RelayOptions,
) -> Transfer {
    let span = tracing::debug_span!("relay", %mode);
    relay_inner(src, dst, mode, options).instrument(span).await
}

async fn relay_inner(
    src: &SharedConnection,
    dst: &SharedConnection,
    mode: TransformMode,
    options: &RelayOptions,
) -> Transfer {
    let transfer = if mode.is_encode() {
        let source = options.transform(mode, src);
        let transfer = copy_buffer(&options.pool, dst.as_ref(), &source).await;

        close_quietly(dst, "destination").await;

        // 源端可能是多路复用连接，对端看不到关闭，需要显式的结束标记
        let notifier = options.transform(mode, src);
        if let Err(e) = notifier.write(END_OF_STREAM).await {
            debug!("Failed to send end-of-stream marker: {}", e);
        }
        transfer
    } else {
        let sink = options.transform(mode, dst);
        let transfer = copy_buffer(&options.pool, &sink, src.as_ref()).await;

        close_quietly(src, "source").await;
        if !options.mux {
            close_quietly(dst, "destination").await;
        }
        transfer
    };

    match &transfer.error {
        None => debug!("Relay finished: {} bytes", transfer.bytes),
        Some(e) => debug!("Relay stopped after {} bytes: {}", transfer.bytes, e),
    }
    transfer
}

async fn close_quietly(conn: &SharedConnection, side: &str) {
    if let Err(e) = conn.close().await {
        debug!("Failed to close {}: {}", side, e);
    }
}
