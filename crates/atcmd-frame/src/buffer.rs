use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Capacity-bounded byte buffer holding the frame being assembled.
///
/// The length always stays strictly below the capacity: an append that
/// would reach it is rejected before anything is written.
#[derive(Debug)]
pub struct CommandBuffer {
    inner: BytesMut,
    capacity: usize,
}

impl CommandBuffer {
    /// Create an empty buffer that holds at most `capacity - 1` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one byte.
    pub fn push(&mut self, byte: u8) -> Result<()> {
        self.check(1)?;
        self.inner.put_u8(byte);
        Ok(())
    }

    /// Append a run of bytes, all or nothing.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        self.check(bytes.len())?;
        self.inner.put_slice(bytes);
        Ok(())
    }

    /// Whether `additional` more bytes fit.
    pub fn fits(&self, additional: usize) -> bool {
        self.check(additional).is_ok()
    }

    fn check(&self, additional: usize) -> Result<()> {
        match self.inner.len().checked_add(additional) {
            Some(end) if end < self.capacity => Ok(()),
            _ => Err(FrameError::BufferOverflow {
                len: self.inner.len(),
                additional,
                capacity: self.capacity,
            }),
        }
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Shorten the buffer to `len` bytes (no-op when already shorter).
    pub fn truncate_to(&mut self, len: usize) {
        self.inner.truncate(len);
    }

    /// Take the buffered bytes, leaving the buffer empty.
    pub fn freeze(&mut self) -> Bytes {
        self.inner.split().freeze()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    pub fn last(&self) -> Option<u8> {
        self.inner.last().copied()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes that can still be appended.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.inner.len() + 1)
    }
}
