/// 流变换模块
///
/// 在原始连接外包装限速、加密、压缩，对外仍提供同样的读写接口。
///
/// 写路径：限速 → 加密（可选）→ 压缩（可选），读路径正好相反。
/// 没有启用任何编解码时数据原样透传；否则每次写入按 [`MAX_FRAME_PAYLOAD`] 切分成帧：
///
/// ```text
/// +----------------+------------------------------------+
/// | len: u32 (BE)  | body = compress?(encrypt?(data))   |
/// +----------------+------------------------------------+
/// ```
use crate::conn::{ConnRead, ConnWrite, SharedConnection};
use crate::crypto::SessionCipher;
use crate::mode::TransformMode;
use crate::rate_limiter::{throttle, RateLimiter};
use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use std::time::Duration;
use tokio::sync::Mutex;

/// 流结束标记，通知无法感知连接关闭的对端（多路复用的共享连接）
pub const END_OF_STREAM: &[u8] = b"PROXYEOF";

/// 单帧最大长度（16MB）
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// 单帧明文上限，压缩和加密后仍不超过 [`MAX_FRAME_LEN`]
pub const MAX_FRAME_PAYLOAD: usize = 8 * 1024 * 1024;

const FRAME_HEADER_LEN: usize = 4;

/// 透传模式下，读到结束标记的前缀后等待剩余部分的时间
const MARKER_HOLD: Duration = Duration::from_millis(50);

/// 压缩方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Snappy,
}

#[derive(Default)]
struct ReadState {
    /// 可以交付给调用者的数据
    backlog: BytesMut,
    /// 透传模式下尾部可能属于结束标记的字节
    held: BytesMut,
    eof: bool,
}

/// 连接变换，从不关闭被包装的连接
pub struct StreamTransform {
    conn: SharedConnection,
    cipher: Option<SessionCipher>,
    rate: Option<RateLimiter>,
    compression: Compression,
    state: Mutex<ReadState>,
}

impl StreamTransform {
    fn new(
        conn: SharedConnection,
        cipher: Option<SessionCipher>,
        rate: Option<RateLimiter>,
        compression: Compression,
    ) -> Self {
        Self {
            conn,
            cipher,
            rate,
            compression,
            state: Mutex::new(ReadState::default()),
        }
    }

    /// 仅加密（或透传）的变换
    pub fn crypt(
        conn: SharedConnection,
        cipher: Option<SessionCipher>,
        rate: Option<RateLimiter>,
    ) -> Self {
        Self::new(conn, cipher, rate, Compression::None)
    }

    /// 压缩 + 可选加密的变换
    pub fn snappy(
        conn: SharedConnection,
        cipher: Option<SessionCipher>,
        rate: Option<RateLimiter>,
    ) -> Self {
        Self::new(conn, cipher, rate, Compression::Snappy)
    }

    /// 按模式选择构造方式
    pub fn for_mode(
        mode: TransformMode,
        conn: SharedConnection,
        cipher: Option<SessionCipher>,
        rate: Option<RateLimiter>,
    ) -> Self {
        if mode.is_compressed() {
            Self::snappy(conn, cipher, rate)
        } else {
            Self::crypt(conn, cipher, rate)
        }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// 是否需要分帧（任一编解码器启用）
    fn is_framed(&self) -> bool {
        self.cipher.is_some() || self.compression == Compression::Snappy
    }

    fn encode_frame(&self, data: &[u8]) -> io::Result<BytesMut> {
        let mut body = match &self.cipher {
            Some(cipher) => cipher.seal(data)?,
            None => data.to_vec(),
        };
        if self.compression == Compression::Snappy {
            body = snap::raw::Encoder::new()
                .compress_vec(&body)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        }
        if body.len() > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame too large: {} bytes (max {})", body.len(), MAX_FRAME_LEN),
            ));
        }

        let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + body.len());
        frame.put_u32(body.len() as u32);
        frame.put_slice(&body);
        Ok(frame)
    }

    /// 读取并解码一帧，连接在帧边界处结束时返回 None
    async fn read_frame(&self) -> io::Result<Option<Vec<u8>>> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        if !read_full(self.conn.as_ref(), &mut header).await? {
            return Ok(None);
        }

        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame too large: {} bytes (max {})", len, MAX_FRAME_LEN),
            ));
        }

        let mut body = vec![0u8; len];
        if len > 0 && !read_full(self.conn.as_ref(), &mut body).await? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside a frame",
            ));
        }

        if self.compression == Compression::Snappy {
            body = snap::raw::Decoder::new()
                .decompress_vec(&body)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        }
        if let Some(cipher) = &self.cipher {
            body = cipher.open(body)?;
        }
        Ok(Some(body))
    }
}

/// 读满 `buf`；一个字节都没读到就遇到 EOF 时返回 false
async fn read_full<R: ConnRead + ?Sized>(src: &R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]).await? {
            0 if filled == 0 => return Ok(false),
            0 => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed inside a frame",
                ))
            }
            n => filled += n,
        }
    }
    Ok(true)
}

/// 写出全部数据
async fn write_full<W: ConnWrite + ?Sized>(dst: &W, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match dst.write(buf).await? {
            0 => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write frame",
                ))
            }
            n => buf = &buf[n..],
        }
    }
    Ok(())
}

#[async_trait]
impl ConnWrite for StreamTransform {
    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        // 空帧在读端会被当作 EOF，直接忽略
        if buf.is_empty() {
            return Ok(0);
        }

        throttle(self.rate.as_ref(), buf.len()).await;

        if !self.is_framed() {
            return self.conn.write(buf).await;
        }

        for chunk in buf.chunks(MAX_FRAME_PAYLOAD) {
            let frame = self.encode_frame(chunk)?;
            write_full(self.conn.as_ref(), &frame).await?;
        }
        Ok(buf.len())
    }
}

#[async_trait]
impl ConnRead for StreamTransform {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock().await;
        if state.backlog.is_empty() {
            if self.is_framed() {
                self.fill_from_frames(&mut state).await?;
            } else {
                self.fill_passthrough(&mut state, buf.len()).await?;
            }
            if state.backlog.is_empty() {
                return Ok(0);
            }
        }

        let n = buf.len().min(state.backlog.len());
        buf[..n].copy_from_slice(&state.backlog[..n]);
        state.backlog.advance(n);
        drop(state);

        throttle(self.rate.as_ref(), n).await;
        Ok(n)
    }
}

impl StreamTransform {
    /// 解码帧直到有数据可交付或遇到结束
    async fn fill_from_frames(&self, state: &mut ReadState) -> io::Result<()> {
        while state.backlog.is_empty() && !state.eof {
            match self.read_frame().await? {
                Some(plain) if plain.as_slice() != END_OF_STREAM => {
                    state.backlog.extend_from_slice(&plain);
                }
                _ => state.eof = true,
            }
        }
        Ok(())
    }

    /// 透传读取，识别位于已读数据末尾的结束标记
    ///
    /// 标记可能和前面的数据在同一次读取中到达，也可能被拆到两次读取中。
    /// 尾部是标记前缀的字节先扣住；[`MARKER_HOLD`] 内没有后续数据时按普通数据交付
    async fn fill_passthrough(&self, state: &mut ReadState, want: usize) -> io::Result<()> {
        while state.backlog.is_empty() && !state.eof {
            let start = state.held.len();
            state.held.resize(start + want.max(END_OF_STREAM.len()), 0);

            let read = if start == 0 {
                self.conn.read(&mut state.held[start..]).await.map(Some)
            } else {
                match tokio::time::timeout(MARKER_HOLD, self.conn.read(&mut state.held[start..]))
                    .await
                {
                    Ok(result) => result.map(Some),
                    Err(_) => Ok(None),
                }
            };

            let n = match read {
                Ok(Some(n)) => n,
                Ok(None) => {
                    state.held.truncate(start);
                    release_held(state, start);
                    continue;
                }
                Err(e) => {
                    state.held.truncate(start);
                    return Err(e);
                }
            };
            state.held.truncate(start + n);

            if n == 0 {
                release_held(state, start);
                state.eof = true;
            } else if state.held.ends_with(END_OF_STREAM) {
                let data_len = state.held.len() - END_OF_STREAM.len();
                release_held(state, data_len);
                state.held.clear();
                state.eof = true;
            } else {
                let data_len = state.held.len() - partial_marker_len(&state.held);
                release_held(state, data_len);
            }
        }
        Ok(())
    }
}

/// 把 `held` 开头的 `len` 个字节移到可交付队列
fn release_held(state: &mut ReadState, len: usize) {
    let data = state.held.split_to(len);
    state.backlog.extend_from_slice(&data);
}

/// `data` 末尾与结束标记前缀重合的最长长度（不含完整标记）
fn partial_marker_len(data: &[u8]) -> usize {
    (1..END_OF_STREAM.len())
        .rev()
        .find(|&k| data.ends_with(&END_OF_STREAM[..k]))
        .unwrap_or(0)
}
