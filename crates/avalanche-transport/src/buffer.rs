// ============================================
// File: crates/avalanche-transport/src/buffer.rs
// ============================================
//! # Receive Buffer Pool
//!
//! ## Creation Reason
//! Every connection needs a fixed-capacity receive buffer for its whole
//! life. Recycling them avoids an allocation per accept.
//!
//! ## Main Functionality
//! - `BufferPool`: Shared stack of zeroed buffers
//! - `PooledBuffer`: RAII guard; the buffer goes back on drop
//!
//! ## ⚠️ Important Note for Next Developer
//! - A buffer is owned by exactly one connection between acquire and drop
//! - Returned buffers are zeroed so stale plaintext never leaks into the
//!   next connection
//!
//! ## Last Modified
//! v0.1.0 - Initial buffer pool

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

// ============================================
// BufferPool
// ============================================

#[derive(Debug)]
struct PoolInner {
    buffer_size: usize,
    max_pooled: usize,
    free: Mutex<Vec<Box<[u8]>>>,
}

/// Pool of equally sized receive buffers.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Creates an empty pool. At most `max_pooled` idle buffers are kept.
    #[must_use]
    pub fn new(buffer_size: usize, max_pooled: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                buffer_size,
                max_pooled,
                free: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Takes a buffer from the pool, allocating if none is idle.
    #[must_use]
    pub fn acquire(&self) -> PooledBuffer {
        let buf = self
            .inner
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.inner.buffer_size].into_boxed_slice());
        PooledBuffer {
            buf: Some(buf),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Capacity of every buffer.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Number of idle buffers.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.inner.free.lock().len()
    }
}

// ============================================
// PooledBuffer
// ============================================

/// A buffer on loan from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Option<Box<[u8]>>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(mut buf) = self.buf.take() {
            let mut free = self.pool.free.lock();
            if free.len() < self.pool.max_pooled {
                buf.fill(0);
                free.push(buf);
            }
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_are_recycled_and_zeroed() {
        let pool = BufferPool::new(32, 4);
        {
            let mut buf = pool.acquire();
            assert_eq!(buf.len(), 32);
            buf[0] = 0xFF;
        }
        assert_eq!(pool.idle(), 1);
        let buf = pool.acquire();
        assert_eq!(buf[0], 0);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_live_buffers_are_distinct() {
        let pool = BufferPool::new(8, 4);
        let mut a = pool.acquire();
        let mut b = pool.acquire();
        a[0] = 1;
        b[0] = 2;
        assert_ne!(a.as_ptr(), b.as_ptr());
        assert_eq!((a[0], b[0]), (1, 2));
    }

    #[test]
    fn test_pool_is_bounded() {
        let pool = BufferPool::new(8, 1);
        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }
}
