/// 自定义错误类型
///
/// 使用 thiserror 定义中继引擎的错误分类，调用者可以据此区分
/// 短写、流错误与配置错误
use std::io;
use thiserror::Error;

/// 中继引擎的主要错误类型
#[derive(Error, Debug)]
pub enum RelayError {
    /// 目标接受的字节数少于读取的字节数
    #[error("Short write: accepted {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// 读写失败（干净的 EOF 除外）
    #[error("Stream error: {0}")]
    Stream(#[from] io::Error),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 密钥派生或加解密初始化失败
    #[error("Crypto error: {0}")]
    CryptoError(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// 创建短写错误
    pub fn short_write(written: usize, expected: usize) -> Self {
        Self::ShortWrite { written, expected }
    }

    /// 创建配置错误
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// 创建加密错误
    pub fn crypto_error(msg: impl Into<String>) -> Self {
        Self::CryptoError(msg.into())
    }

    /// 检查是否为短写错误
    pub fn is_short_write(&self) -> bool {
        matches!(self, Self::ShortWrite { .. })
    }

    /// 检查是否为流错误
    pub fn is_stream_error(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// 检查是否为配置错误
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError(_))
    }

    /// 流错误的 I/O 类型
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Stream(e) => Some(e.kind()),
            _ => None,
        }
    }
}
