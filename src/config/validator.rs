use anyhow::{bail, Result};
use tracing::warn;

use super::{ClientSection, RelayConfig, RelaySettings, ServerSection};
use crate::mode::select_modes;
use crate::rate_limiter::RateLimiterConfig;

/// 加密密钥最小长度
const MIN_CRYPT_KEY_LEN: usize = 16;

/// 配置验证器 - 负责所有配置验证逻辑
pub struct ConfigValidator;

impl ConfigValidator {
    /// 验证加密密钥强度
    pub fn validate_crypt_key(crypt_key: &str) -> Result<()> {
        if crypt_key.len() < MIN_CRYPT_KEY_LEN {
            bail!(
                "crypt_key must be at least {} characters for security (current length: {})",
                MIN_CRYPT_KEY_LEN,
                crypt_key.len()
            );
        }
        Ok(())
    }

    /// 验证地址不为空
    pub fn validate_address(addr: &str, context: &str) -> Result<()> {
        if addr.trim().is_empty() {
            bail!("{}: address cannot be empty", context);
        }
        Ok(())
    }

    /// 验证 [relay] 段
    pub fn validate_relay_settings(settings: &RelaySettings) -> Result<()> {
        select_modes(&settings.compress)?;

        if settings.crypt {
            match settings.crypt_key.as_deref() {
                Some(key) => Self::validate_crypt_key(key)?,
                None => bail!("crypt_key is required when crypt = true"),
            }
        } else if settings.crypt_key.is_some() {
            warn!("crypt_key is set but crypt = false, traffic will not be encrypted");
        }

        if settings.buffer_size == 0 {
            bail!("buffer_size must be greater than 0");
        }
        if settings.pool_capacity == 0 {
            bail!("pool_capacity must be greater than 0");
        }
        if settings.flush_timeout_ms == 0 {
            bail!("flush_timeout_ms must be greater than 0");
        }
        if settings.keepalive_secs == Some(0) {
            bail!("keepalive_secs must be greater than 0 when set");
        }
        Ok(())
    }

    /// 验证带宽限制配置
    pub fn validate_rate_limit_config(config: &RateLimiterConfig) -> Result<()> {
        if config.bytes_per_second == 0 {
            bail!("rate_limit.bytes_per_second must be greater than 0");
        }
        if config.burst_bytes == 0 {
            bail!("rate_limit.burst_bytes must be greater than 0");
        }
        Ok(())
    }

    pub fn validate_server_section(section: &ServerSection) -> Result<()> {
        Self::validate_address(&section.listen, "server.listen")?;
        Self::validate_address(&section.target, "server.target")?;
        Ok(())
    }

    pub fn validate_client_section(section: &ClientSection) -> Result<()> {
        Self::validate_address(&section.listen, "client.listen")?;
        Self::validate_address(&section.remote, "client.remote")?;
        Ok(())
    }

    /// 验证完整配置
    pub fn validate_relay_config(config: &RelayConfig) -> Result<()> {
        Self::validate_relay_settings(&config.relay)?;

        if let Some(ref rate_limit) = config.rate_limit {
            Self::validate_rate_limit_config(rate_limit)?;
        }
        if let Some(ref server) = config.server {
            Self::validate_server_section(server)?;
        }
        if let Some(ref client) = config.client {
            Self::validate_client_section(client)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_crypt_key() {
        // 短密钥应该失败
        assert!(ConfigValidator::validate_crypt_key("short").is_err());

        // 16 个字符以上应该成功
        assert!(ConfigValidator::validate_crypt_key(&"k".repeat(16)).is_ok());
        assert!(ConfigValidator::validate_crypt_key(&"k".repeat(64)).is_ok());
    }

    #[test]
    fn test_validate_address() {
        assert!(ConfigValidator::validate_address("", "test").is_err());
        assert!(ConfigValidator::validate_address("   ", "test").is_err());
        assert!(ConfigValidator::validate_address("127.0.0.1:9000", "test").is_ok());
    }

    #[test]
    fn test_validate_relay_settings() {
        let mut settings = RelaySettings::default();
        assert!(ConfigValidator::validate_relay_settings(&settings).is_ok());

        settings.compress = "lz4".to_string();
        assert!(ConfigValidator::validate_relay_settings(&settings).is_err());
        settings.compress = "snappy".to_string();
        assert!(ConfigValidator::validate_relay_settings(&settings).is_ok());

        // 开启加密但没有密钥
        settings.crypt = true;
        assert!(ConfigValidator::validate_relay_settings(&settings).is_err());
        settings.crypt_key = Some("weak".to_string());
        assert!(ConfigValidator::validate_relay_settings(&settings).is_err());
        settings.crypt_key = Some("a".repeat(20));
        assert!(ConfigValidator::validate_relay_settings(&settings).is_ok());

        settings.buffer_size = 0;
        assert!(ConfigValidator::validate_relay_settings(&settings).is_err());
        settings.buffer_size = 1024;

        settings.pool_capacity = 0;
        assert!(ConfigValidator::validate_relay_settings(&settings).is_err());
        settings.pool_capacity = 4;

        settings.keepalive_secs = Some(0);
        assert!(ConfigValidator::validate_relay_settings(&settings).is_err());
    }

    #[test]
    fn test_validate_rate_limit_config() {
        // bytes_per_second = 0 应该失败
        let invalid = RateLimiterConfig {
            bytes_per_second: 0,
            burst_bytes: 1024,
        };
        assert!(ConfigValidator::validate_rate_limit_config(&invalid).is_err());

        // burst_bytes = 0 应该失败
        let invalid = RateLimiterConfig {
            bytes_per_second: 1024,
            burst_bytes: 0,
        };
        assert!(ConfigValidator::validate_rate_limit_config(&invalid).is_err());

        assert!(ConfigValidator::validate_rate_limit_config(&RateLimiterConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_sections() {
        let server = ServerSection {
            listen: "0.0.0.0:9000".to_string(),
            target: "".to_string(),
        };
        assert!(ConfigValidator::validate_server_section(&server).is_err());

        let client = ClientSection {
            listen: "127.0.0.1:1080".to_string(),
            remote: "example.com:9000".to_string(),
        };
        assert!(ConfigValidator::validate_client_section(&client).is_ok());
    }
}
