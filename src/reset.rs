/// 连接重置：归还到复用池之前清空缓冲区中的残留数据
use crate::buffer_pool::BufferPool;
use crate::conn::Connection;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// 默认清空超时
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// 使用默认超时清空连接
pub async fn flush_connection<C: Connection + ?Sized>(conn: &C, pool: &BufferPool) -> u64 {
    flush_connection_with_timeout(conn, pool, DEFAULT_FLUSH_TIMEOUT).await
}

/// 读取并丢弃残留数据，直到任何读错误（包括超时）或 EOF
///
/// 所有错误都视为清空完成，返回丢弃的字节数
pub async fn flush_connection_with_timeout<C: Connection + ?Sized>(
    conn: &C,
    pool: &BufferPool,
    timeout: Duration,
) -> u64 {
    conn.set_read_deadline(Some(Instant::now() + timeout));

    let mut buf = pool.get();
    let mut drained = 0u64;
    loop {
        match conn.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => drained += n as u64,
            Err(e) => {
                debug!("Flush stopped: {}", e);
                break;
            }
        }
    }
    drop(buf);

    conn.set_read_deadline(None);
    debug!("Flushed {} stale bytes", drained);
    drained
}
