use std::path::PathBuf;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the specified device or path.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer side went away (zero-length write or closed loopback).
    #[error("transport closed")]
    Closed,

    /// The transport refused the write without an I/O error to report.
    #[error("write rejected by transport: {0}")]
    WriteRejected(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
