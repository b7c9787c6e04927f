use std::fmt;
use std::io::{ErrorKind, Write};
use std::sync::Arc;

use crate::error::{Result, TransportError};

/// A byte link to the remote host.
///
/// The implementing value is the context shared by all three operations, so
/// state a driver needs (device handles, counters) lives in `self`. Methods
/// take `&self` because the input thread reads while other threads write
/// responses.
pub trait Transport: Send + Sync {
    /// Returns true if input is waiting to be read.
    ///
    /// Implementations may block here until data arrives; the input loop
    /// then becomes purely reactive instead of polling.
    fn is_data_ready(&self) -> bool;

    /// Read available input into `buf`, returning the number of bytes read.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer to the host.
    fn write(&self, buf: &[u8]) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn is_data_ready(&self) -> bool {
        (**self).is_data_ready()
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&self, buf: &[u8]) -> Result<()> {
        (**self).write(buf)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn is_data_ready(&self) -> bool {
        (**self).is_data_ready()
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&self, buf: &[u8]) -> Result<()> {
        (**self).write(buf)
    }
}

type ReadyFn = Box<dyn Fn() -> bool + Send + Sync>;
type ReadFn = Box<dyn Fn(&mut [u8]) -> Result<usize> + Send + Sync>;
type WriteFn = Box<dyn Fn(&[u8]) -> Result<()> + Send + Sync>;

/// A transport assembled from three callbacks.
///
/// Useful when the link is owned by an existing driver: the closures capture
/// whatever context the driver needs.
pub struct FnTransport {
    is_data_ready: ReadyFn,
    read: ReadFn,
    write: WriteFn,
}

impl FnTransport {
    /// Create a transport from data-ready, read and write callbacks.
    pub fn new<R, D, W>(is_data_ready: R, read: D, write: W) -> Self
    where
        R: Fn() -> bool + Send + Sync + 'static,
        D: Fn(&mut [u8]) -> Result<usize> + Send + Sync + 'static,
        W: Fn(&[u8]) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            is_data_ready: Box::new(is_data_ready),
            read: Box::new(read),
            write: Box::new(write),
        }
    }
}

impl Transport for FnTransport {
    fn is_data_ready(&self) -> bool {
        (self.is_data_ready)()
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        (self.read)(buf)
    }

    fn write(&self, buf: &[u8]) -> Result<()> {
        (self.write)(buf)
    }
}

impl fmt::Debug for FnTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransport").finish_non_exhaustive()
    }
}

/// Write all of `buf` to `out`, retrying interrupted and would-block writes.
///
/// A zero-length write means the other side is gone.
pub fn write_all_retrying<W: Write + ?Sized>(out: &mut W, buf: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < buf.len() {
        match out.write(&buf[offset..]) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    loop {
        match out.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}
