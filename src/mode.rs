/// 变换模式选择
///
/// 只有这里认识压缩方式的名字，其余模块只看 [`TransformMode`]
use crate::error::{RelayError, Result};
use std::fmt;

/// 不压缩
pub const COMPRESS_NONE: &str = "";

/// Snappy 压缩
pub const COMPRESS_SNAPPY: &str = "snappy";

/// 中继方向使用的变换模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformMode {
    /// 解码源端的原始/加密数据后输出明文
    RawEncode,
    /// 将明文编码（加密）后写入目标端
    RawDecode,
    /// 解压解码源端数据后输出明文
    CompressedEncode,
    /// 将明文压缩编码后写入目标端
    CompressedDecode,
}

impl TransformMode {
    /// 是否为 encode 方向（包装源端）
    pub fn is_encode(self) -> bool {
        matches!(self, Self::RawEncode | Self::CompressedEncode)
    }

    /// 是否启用压缩
    pub fn is_compressed(self) -> bool {
        matches!(self, Self::CompressedEncode | Self::CompressedDecode)
    }
}

impl fmt::Display for TransformMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RawEncode => "raw-encode",
            Self::RawDecode => "raw-decode",
            Self::CompressedEncode => "compressed-encode",
            Self::CompressedDecode => "compressed-decode",
        };
        f.write_str(name)
    }
}

/// 一个会话两个方向的模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePair {
    /// peer → bridge 方向
    pub decode: TransformMode,
    /// bridge → peer 方向
    pub encode: TransformMode,
}

/// 根据压缩方式名称选择 (decode, encode) 模式
///
/// 未知名称返回配置错误，应在服务启动时调用一次
pub fn select_modes(compress: &str) -> Result<ModePair> {
    match compress {
        COMPRESS_NONE => Ok(ModePair {
            decode: TransformMode::RawDecode,
            encode: TransformMode::RawEncode,
        }),
        COMPRESS_SNAPPY => Ok(ModePair {
            decode: TransformMode::CompressedDecode,
            encode: TransformMode::CompressedEncode,
        }),
        other => Err(RelayError::config_error(format!(
            "unsupported compress mode '{}' (expected \"\" or \"{}\")",
            other, COMPRESS_SNAPPY
        ))),
    }
}
