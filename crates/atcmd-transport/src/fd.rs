use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{write_all_retrying, Transport};

/// `poll(2)` events that make the next read worth attempting. Error and
/// hangup conditions count, so the read reports them instead of the loop
/// idling on a dead descriptor.
const READY_EVENTS: libc::c_short = libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;

/// File-descriptor transport for serial devices, FIFOs and stdio.
///
/// Readiness is checked with `poll(2)`, waiting up to the poll timeout, so
/// the input loop sleeps in the kernel instead of spinning.
#[derive(Debug)]
pub struct FdTransport {
    reader: Mutex<File>,
    writer: Mutex<File>,
    read_fd: RawFd,
    poll_timeout: Duration,
}

impl FdTransport {
    /// Default time `is_data_ready` waits for input.
    pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(10);

    /// Build a transport from separate read and write handles.
    pub fn from_files(reader: File, writer: File) -> Self {
        let read_fd = reader.as_raw_fd();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            read_fd,
            poll_timeout: Self::DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Open a device (for example `/dev/ttyUSB0`) or FIFO for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let open_err = |source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        };

        let reader = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(open_err)?;
        let writer = reader.try_clone().map_err(open_err)?;

        debug!(?path, "opened transport device");
        Ok(Self::from_files(reader, writer))
    }

    /// Use the process stdin/stdout.
    ///
    /// The descriptors are duplicated so reads bypass the std buffering that
    /// would otherwise hide pending bytes from `poll`.
    pub fn stdio() -> Result<Self> {
        let reader = std::io::stdin().as_fd().try_clone_to_owned()?;
        let writer = std::io::stdout().as_fd().try_clone_to_owned()?;
        Ok(Self::from_files(File::from(reader), File::from(writer)))
    }

    /// Set how long `is_data_ready` waits before reporting no input.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Current readiness poll timeout.
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }
}

impl Transport for FdTransport {
    fn is_data_ready(&self) -> bool {
        let mut pfd = libc::pollfd {
            fd: self.read_fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout = self.poll_timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `pfd` is a valid, writable pollfd and the count matches the
        // single element passed. `read_fd` stays open for the lifetime of
        // `self.reader`.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout) };

        rc > 0 && (pfd.revents & READY_EVENTS) != 0
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut reader = lock(&self.reader);
        loop {
            match reader.read(buf) {
                Ok(0) if !buf.is_empty() => return Err(TransportError::Closed),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn write(&self, buf: &[u8]) -> Result<()> {
        let mut writer = lock(&self.writer);
        write_all_retrying(&mut *writer, buf)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::fd::FromRawFd;
    use std::os::unix::net::UnixStream;

    use super::*;

    fn socket_files() -> (File, File, UnixStream) {
        let (local, remote) = UnixStream::pair().unwrap();
        let writer = local.try_clone().unwrap();
        let reader = File::from(std::os::fd::OwnedFd::from(local));
        let writer = File::from(std::os::fd::OwnedFd::from(writer));
        (reader, writer, remote)
    }

    #[test]
    fn poll_reports_pending_input() {
        let (reader, writer, mut remote) = socket_files();
        let transport =
            FdTransport::from_files(reader, writer).with_poll_timeout(Duration::from_millis(1));

        assert!(!transport.is_data_ready());
        remote.write_all(b"AT+0000").unwrap();
        assert!(transport.is_data_ready());

        let mut buf = [0u8; 64];
        let n = transport.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"AT+0000");
    }

    #[test]
    fn writes_reach_the_peer() {
        let (reader, writer, mut remote) = socket_files();
        let transport = FdTransport::from_files(reader, writer);

        transport.write(b"+H0002,7;hi;\r\n").unwrap();

        let mut buf = [0u8; 32];
        let n = std::io::Read::read(&mut remote, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"+H0002,7;hi;\r\n");
    }

    #[test]
    fn peer_hangup_reads_as_closed() {
        let (reader, writer, remote) = socket_files();
        let transport = FdTransport::from_files(reader, writer);
        drop(remote);

        assert!(transport.is_data_ready());
        let mut buf = [0u8; 8];
        assert!(matches!(
            transport.read(&mut buf),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn descriptor_error_is_ready_and_read_fails() {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` has room for the two descriptors pipe(2) returns.
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        // SAFETY: both descriptors were just created and have no other owner.
        let (read_end, write_end) = unsafe {
            (
                std::os::fd::OwnedFd::from_raw_fd(fds[0]),
                std::os::fd::OwnedFd::from_raw_fd(fds[1]),
            )
        };
        drop(read_end);

        // Polling the write end of a pipe with no reader yields POLLERR.
        let write_end = File::from(write_end);
        let transport = FdTransport::from_files(write_end.try_clone().unwrap(), write_end)
            .with_poll_timeout(Duration::from_millis(1));

        assert!(transport.is_data_ready());
        let mut buf = [0u8; 8];
        assert!(matches!(transport.read(&mut buf), Err(TransportError::Io(_))));
    }

    #[test]
    fn open_missing_device_reports_path() {
        let err = FdTransport::open("/nonexistent/atcmd-test-device").unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
        assert!(err.to_string().contains("/nonexistent/atcmd-test-device"));
    }
}
