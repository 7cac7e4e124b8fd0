/// Tunnel Relay 库入口
///
/// 将核心模块导出为库，方便测试和复用
pub mod buffer_pool;
pub mod cli;
pub mod client;
pub mod config;
pub mod conn;
pub mod copy;
pub mod crypto;
pub mod duplex;
pub mod error;
pub mod mode;
pub mod rate_limiter;
pub mod relay;
pub mod reset;
pub mod server;
pub mod stats;
pub mod transform;
pub mod tunnel;

// 重新导出常用类型
pub use buffer_pool::{BufferPool, PooledBuffer};
pub use config::RelayConfig;
pub use conn::{ConnRead, ConnWrite, Connection, SharedConnection, StreamConnection};
pub use copy::{copy_buffer, Transfer};
pub use crypto::SessionCipher;
pub use duplex::{DuplexReport, DuplexSession};
pub use error::{RelayError, Result};
pub use mode::{select_modes, ModePair, TransformMode};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use relay::{relay, RelayOptions};
pub use reset::{flush_connection, flush_connection_with_timeout};
pub use stats::{RelayStats, RelayStatsTracker};
pub use transform::{StreamTransform, END_OF_STREAM};
pub use tunnel::{Side, Tunnel};
