use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// In-memory loopback transport.
///
/// Inbound bytes are queued as discrete chunks so tests control exactly how
/// a stream is split across reads. Every `write` call is recorded as one
/// entry, which makes frame boundaries on the output side observable.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inbound: Mutex<VecDeque<Vec<u8>>>,
    writes: Mutex<Vec<Vec<u8>>>,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

impl MemoryTransport {
    /// Create an empty loopback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one inbound chunk. Empty chunks are ignored.
    pub fn push_input(&self, chunk: impl AsRef<[u8]>) {
        let chunk = chunk.as_ref();
        if chunk.is_empty() {
            return;
        }
        lock(&self.inbound).push_back(chunk.to_vec());
    }

    /// Number of inbound chunks not yet read.
    pub fn pending_input(&self) -> usize {
        lock(&self.inbound).len()
    }

    /// Every write performed so far, one entry per call.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.writes).clone()
    }

    /// All written bytes concatenated.
    pub fn output(&self) -> Vec<u8> {
        lock(&self.writes).concat()
    }

    /// Drain and return the recorded writes.
    pub fn take_writes(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *lock(&self.writes))
    }

    /// Mark the inbound side closed. Chunks already queued are still
    /// delivered; after that, reads report [`TransportError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Transport for MemoryTransport {
    fn is_data_ready(&self) -> bool {
        // A closed loopback stays "ready" so readers observe the close.
        !lock(&self.inbound).is_empty() || self.closed.load(Ordering::SeqCst)
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut inbound = lock(&self.inbound);
        let Some(mut chunk) = inbound.pop_front() else {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            return Ok(0);
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            inbound.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::WriteRejected("loopback write failure".into()));
        }
        lock(&self.writes).push(buf.to_vec());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
