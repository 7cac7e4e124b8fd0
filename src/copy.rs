/// 池化缓冲区拷贝
///
/// 优化版的 io::copy：每轮读写只借出一个池化缓冲区，写完立即归还，
/// 便于快速回收和重用
use crate::buffer_pool::BufferPool;
use crate::conn::{ConnRead, ConnWrite};
use crate::error::{RelayError, Result};

/// 一次拷贝（或一个中继方向）的结果
///
/// 出错时仍然记录已经写出的字节数，便于统计
#[derive(Debug)]
pub struct Transfer {
    /// 已写出的字节数
    pub bytes: u64,
    /// 终止错误（干净结束时为 None）
    pub error: Option<RelayError>,
}

impl Transfer {
    pub fn completed(bytes: u64) -> Self {
        Self { bytes, error: None }
    }

    pub fn failed(bytes: u64, error: RelayError) -> Self {
        Self {
            bytes,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// 转换为 Result，丢弃出错时的字节数
    pub fn into_result(self) -> Result<u64> {
        match self.error {
            None => Ok(self.bytes),
            Some(e) => Err(e),
        }
    }
}

/// 将 `src` 的全部数据拷贝到 `dst`，直到干净的 EOF 或出错
///
/// 不会关闭任何一端；连接的关闭由调用方的关闭策略负责
pub async fn copy_buffer<W, R>(pool: &BufferPool, dst: &W, src: &R) -> Transfer
where
    W: ConnWrite + ?Sized,
    R: ConnRead + ?Sized,
{
    let mut written: u64 = 0;

    loop {
        let mut buf = pool.get();
        let read = src.read(&mut buf).await;
        let nr = *read.as_ref().unwrap_or(&0);

        if nr > 0 {
            let write = dst.write(&buf[..nr]).await;
            // 写调用返回后立即归还，先于检查写错误
            drop(buf);

            let nw = match write {
                Ok(nw) => nw.min(nr),
                Err(e) => return Transfer::failed(written, e.into()),
            };
            written += nw as u64;
            if nw < nr {
                return Transfer::failed(written, RelayError::short_write(nw, nr));
            }
        } else {
            drop(buf);
        }

        match read {
            Ok(0) => return Transfer::completed(written),
            Ok(_) => {}
            Err(e) => return Transfer::failed(written, e.into()),
        }
    }
}
