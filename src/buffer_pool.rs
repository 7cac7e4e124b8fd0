/// 缓冲区池模块
///
/// 进程内共享的定长缓冲区池，拷贝循环每次读写只借出一个缓冲区，
/// 峰值内存与并发流数量无关
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// 默认拷贝缓冲区大小（32KB）
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// 默认池容量
pub const DEFAULT_POOL_CAPACITY: usize = 256;

/// 定长缓冲区池
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    buffer_size: usize,
    capacity: usize,
}

impl BufferPool {
    /// 创建缓冲区池并预先填满 `capacity` 个缓冲区
    pub fn new(buffer_size: usize, capacity: usize) -> Self {
        let buffers = (0..capacity).map(|_| vec![0u8; buffer_size]).collect();
        Self {
            buffers: Mutex::new(buffers),
            buffer_size,
            capacity,
        }
    }

    /// 使用默认配置创建缓冲区池
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY)
    }

    /// 借出一个缓冲区，池为空时临时分配
    pub fn get(&self) -> PooledBuffer<'_> {
        let buf = self
            .buffers
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buffer_size]);
        PooledBuffer {
            pool: self,
            buf: Some(buf),
        }
    }

    fn put(&self, buf: Vec<u8>) {
        let mut buffers = self.buffers.lock();
        // 超出容量的临时缓冲区直接丢弃
        if buffers.len() < self.capacity {
            buffers.push(buf);
        }
    }

    /// 当前空闲缓冲区数量
    pub fn available(&self) -> usize {
        self.buffers.lock().len()
    }

    /// 单个缓冲区大小
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// 池容量
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// 借出的缓冲区，Drop 时归还到池中
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Option<Vec<u8>>,
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(buf);
        }
    }
}
