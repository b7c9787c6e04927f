//! Byte transport abstraction for AT command links.
//!
//! The parser never touches a device directly. It asks a [`Transport`]
//! whether input is waiting, reads whatever chunk is available, and writes
//! complete response frames back:
//! - File-descriptor transports (serial devices, FIFOs, stdio) on Unix
//! - Closure-backed transports for embedding into existing drivers
//! - An in-memory loopback for tests
//!
//! This is the lowest layer of atcmd. Everything else builds on top of
//! the [`Transport`] trait provided here.

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod fd;

pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use traits::{FnTransport, Transport};

#[cfg(unix)]
pub use fd::FdTransport;
