// 配置管理模块

mod validator;

pub use validator::ConfigValidator;

use crate::buffer_pool::{BufferPool, DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY};
use crate::crypto::SessionCipher;
use crate::mode::{select_modes, ModePair};
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::relay::RelayOptions;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// 中继参数（[relay] 段）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// 压缩方式（"" 或 "snappy"）
    #[serde(default)]
    pub compress: String,
    /// 是否加密桥接端流量
    #[serde(default)]
    pub crypt: bool,
    /// 加密密钥（crypt = true 时必填）
    #[serde(default)]
    pub crypt_key: Option<String>,
    /// 目标端是否为多路复用的共享连接
    #[serde(default)]
    pub mux: bool,
    /// 拷贝缓冲区大小（字节）
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// 缓冲区池容量
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
    /// 连接清空超时（毫秒）
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
    /// TCP keepalive 间隔（秒，可选）
    #[serde(default)]
    pub keepalive_secs: Option<u64>,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_pool_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}

fn default_flush_timeout_ms() -> u64 {
    3000
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            compress: String::new(),
            crypt: false,
            crypt_key: None,
            mux: false,
            buffer_size: default_buffer_size(),
            pool_capacity: default_pool_capacity(),
            flush_timeout_ms: default_flush_timeout_ms(),
            keepalive_secs: None,
        }
    }
}

/// 服务器端配置：接受编码流量，拨号到明文目标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// 监听地址（桥接端）
    pub listen: String,
    /// 目标地址（对端）
    pub target: String,
}

/// 客户端配置：接受明文流量，拨号到远端服务器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSection {
    /// 监听地址（对端）
    pub listen: String,
    /// 远端服务器地址（桥接端）
    pub remote: String,
}

/// 完整配置文件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub relay: RelaySettings,
    /// 带宽限制（可选）
    #[serde(default)]
    pub rate_limit: Option<RateLimiterConfig>,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub client: Option<ClientSection>,
}

impl RelayConfig {
    /// 从文件加载并验证配置
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 文本解析并验证配置
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: RelayConfig =
            toml::from_str(content).context("Failed to parse relay configuration")?;
        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> anyhow::Result<()> {
        ConfigValidator::validate_relay_config(self)
    }

    /// 方向模式
    pub fn modes(&self) -> crate::Result<ModePair> {
        select_modes(&self.relay.compress)
    }

    /// 根据 crypt / crypt_key 构造加密器
    pub fn cipher(&self) -> crate::Result<Option<SessionCipher>> {
        if !self.relay.crypt {
            return Ok(None);
        }
        let key = self.relay.crypt_key.as_deref().unwrap_or_default();
        SessionCipher::from_secret(key).map(Some)
    }

    /// 根据 [rate_limit] 构造限速器
    pub fn rate_limiter(&self) -> crate::Result<Option<RateLimiter>> {
        self.rate_limit.clone().map(RateLimiter::new).transpose()
    }

    /// 创建缓冲区池
    pub fn buffer_pool(&self) -> BufferPool {
        BufferPool::new(self.relay.buffer_size, self.relay.pool_capacity)
    }

    /// 构造两个方向共用的中继参数
    pub fn relay_options(&self, pool: Arc<BufferPool>) -> crate::Result<RelayOptions> {
        Ok(RelayOptions::new(pool)
            .with_cipher(self.cipher()?)
            .with_mux(self.relay.mux)
            .with_rate(self.rate_limiter()?))
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.relay.flush_timeout_ms)
    }

    pub fn keepalive(&self) -> Option<Duration> {
        self.relay.keepalive_secs.map(Duration::from_secs)
    }
}
