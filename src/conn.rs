/// 连接抽象模块
///
/// 中继引擎只通过 read / write / close / set_read_deadline 四个能力访问连接，
/// 所有方法都使用 `&self`，两个方向可以通过 `Arc` 共享同一条连接
use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// 可读的一端
#[async_trait]
pub trait ConnRead: Send + Sync {
    /// 读取数据，`Ok(0)` 表示干净的流结束
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// 可写的一端
#[async_trait]
pub trait ConnWrite: Send + Sync {
    /// 写入数据，返回目标接受的字节数
    async fn write(&self, buf: &[u8]) -> io::Result<usize>;
}

/// 双向字节流连接
#[async_trait]
pub trait Connection: ConnRead + ConnWrite {
    /// 关闭连接，挂起中的读取会立即返回错误
    async fn close(&self) -> io::Result<()>;

    /// 设置读取截止时间，`None` 表示清除
    fn set_read_deadline(&self, deadline: Option<Instant>);
}

/// 在多个任务间共享的连接
pub type SharedConnection = Arc<dyn Connection>;

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "use of closed connection")
}

fn write_closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "write on closed connection")
}

/// 基于 tokio 字节流的连接实现
///
/// 读写两半分别加锁，关闭信号通过 [`CancellationToken`] 通知挂起的读写
pub struct StreamConnection<S> {
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    closed: CancellationToken,
    read_deadline: parking_lot::Mutex<Option<Instant>>,
    label: String,
}

impl<S> StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// 包装一个字节流
    pub fn new(stream: S, label: impl Into<String>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: CancellationToken::new(),
            read_deadline: parking_lot::Mutex::new(None),
            label: label.into(),
        }
    }

    /// 连接描述（通常是对端地址）
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 是否已关闭
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// 转换为共享连接
    pub fn into_shared(self) -> SharedConnection {
        Arc::new(self)
    }
}

impl StreamConnection<DuplexStream> {
    /// 创建一对互相连通的内存连接
    pub fn pipe(capacity: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(capacity);
        (Self::new(a, "pipe-a"), Self::new(b, "pipe-b"))
    }
}

impl StreamConnection<TcpStream> {
    /// 包装 TCP 连接，并按需开启 keepalive
    pub fn from_tcp(stream: TcpStream, keepalive: Option<Duration>) -> Self {
        if let Some(time) = keepalive {
            apply_keepalive(&stream, time);
        }
        let label = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into());
        Self::new(stream, label)
    }
}

/// 设置 TCP keepalive，失败时仅记录警告
pub fn apply_keepalive(stream: &TcpStream, time: Duration) {
    let keepalive = TcpKeepalive::new().with_time(time).with_interval(time);
    let sock_ref = SockRef::from(stream);
    if let Err(e) = sock_ref.set_tcp_keepalive(&keepalive) {
        warn!(
            "Failed to set TCP keepalive on {}: {}",
            stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".into()),
            e
        );
    }
}

#[async_trait]
impl<S> ConnRead for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed.is_cancelled() {
            return Err(closed_error());
        }

        let mut reader = tokio::select! {
            _ = self.closed.cancelled() => return Err(closed_error()),
            guard = self.reader.lock() => guard,
        };

        let deadline = *self.read_deadline.lock();
        if let Some(deadline) = deadline {
            // 截止时间已过，即使有数据可读也立即超时
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "read deadline exceeded",
                ));
            }
        }

        let read = async {
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, reader.read(buf))
                    .await
                    .unwrap_or_else(|_| {
                        Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "read deadline exceeded",
                        ))
                    }),
                None => reader.read(buf).await,
            }
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(closed_error()),
            result = read => result,
        }
    }
}

#[async_trait]
impl<S> ConnWrite for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.is_cancelled() {
            return Err(write_closed_error());
        }

        let mut writer = tokio::select! {
            _ = self.closed.cancelled() => return Err(write_closed_error()),
            guard = self.writer.lock() => guard,
        };

        let write = async {
            writer.write_all(buf).await?;
            writer.flush().await
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(write_closed_error()),
            result = write => result.map(|_| buf.len()),
        }
    }
}

#[async_trait]
impl<S> Connection for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn close(&self) -> io::Result<()> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        // 先发出关闭信号，让持有写锁的写操作退出
        self.closed.cancel();
        let mut writer = self.writer.lock().await;
        writer.shutdown().await
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) {
        *self.read_deadline.lock() = deadline;
    }
}
