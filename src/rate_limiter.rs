/// 速率限制器模块
///
/// 使用 token bucket 算法限制带宽，一个令牌对应一个字节。
/// 克隆出的限制器共享同一个令牌桶，可以在多个会话间并发使用
use crate::error::{RelayError, Result};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// 速率限制器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// 每秒允许的字节数
    pub bytes_per_second: u32,
    /// 突发容量（字节）
    pub burst_bytes: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            bytes_per_second: 1024 * 1024, // 默认 1MB/s
            burst_bytes: 64 * 1024,        // 允许 64KB 突发
        }
    }
}

/// 带宽限制器
pub struct RateLimiter {
    inner: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// 创建新的速率限制器
    pub fn new(config: RateLimiterConfig) -> Result<Self> {
        let rate = NonZeroU32::new(config.bytes_per_second)
            .ok_or_else(|| RelayError::config_error("bytes_per_second must be > 0"))?;
        let burst = NonZeroU32::new(config.burst_bytes)
            .ok_or_else(|| RelayError::config_error("burst_bytes must be > 0"))?;

        let quota = Quota::per_second(rate).allow_burst(burst);
        let limiter = Arc::new(GovernorLimiter::direct(quota));

        Ok(Self {
            inner: limiter,
            config,
        })
    }

    /// 尝试消耗 `bytes` 个令牌（非阻塞）
    ///
    /// 返回 Err(Duration) 表示需要等待的时间；超过突发容量的请求按突发容量计算
    pub fn check(&self, bytes: usize) -> std::result::Result<(), Duration> {
        let n = match NonZeroU32::new(self.clamp(bytes)) {
            Some(n) => n,
            None => return Ok(()),
        };
        match self.inner.check_n(n) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(not_until)) => {
                let wait_time = not_until.wait_time_from(DefaultClock::default().now());
                Err(wait_time)
            }
            // clamp 之后不会超出容量
            Err(_) => Ok(()),
        }
    }

    /// 异步等待直到消耗完 `bytes` 个令牌
    pub async fn consume(&self, bytes: usize) {
        let mut remaining = bytes;
        while remaining > 0 {
            let chunk = self.clamp(remaining) as usize;
            loop {
                match self.check(chunk) {
                    Ok(_) => break,
                    Err(wait_time) => {
                        tokio::time::sleep(wait_time).await;
                    }
                }
            }
            remaining -= chunk;
        }
    }

    /// 获取配置信息
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn clamp(&self, bytes: usize) -> u32 {
        bytes.min(self.config.burst_bytes as usize) as u32
    }
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish()
    }
}

/// 按限制器消耗令牌，`None` 表示不限速
pub async fn throttle(limiter: Option<&RateLimiter>, bytes: usize) {
    if let Some(limiter) = limiter {
        limiter.consume(bytes).await;
    }
}
