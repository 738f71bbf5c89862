//! Freelist of copy buffers for streamed responses.

use std::sync::Mutex;

use bytes::BytesMut;

/// Upper bound on idle buffers kept around.
const MAX_IDLE: usize = 64;

/// Simple freelist: `get` hands out an empty buffer, `put` takes it back.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    size: usize,
}

impl BufferPool {
    pub fn new(size: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            size: size.max(1),
        }
    }

    /// Capacity of buffers handed out by this pool.
    pub fn buffer_size(&self) -> usize {
        self.size
    }

    pub fn get(&self) -> BytesMut {
        let reused = self.free.lock().unwrap_or_else(|e| e.into_inner()).pop();
        reused.unwrap_or_else(|| BytesMut::with_capacity(self.size))
    }

    /// Return a buffer. Undersized buffers are dropped instead of pooled.
    pub fn put(&self, mut buf: BytesMut) {
        buf.clear();
        if buf.capacity() < self.size {
            return;
        }
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < MAX_IDLE {
            free.push(buf);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
