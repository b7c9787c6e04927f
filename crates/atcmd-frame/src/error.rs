use atcmd_transport::TransportError;

/// Errors that can occur while scanning request frames or encoding responses.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A byte in the 4-digit size field was not a decimal digit.
    #[error("invalid size digit '{}'", .0.escape_ascii())]
    InvalidSizeDigit(u8),

    /// The size field declares more than an explicit frame may carry.
    #[error("declared size {0} exceeds maximum")]
    InvalidSize(usize),

    /// The header has no serial number digits.
    #[error("invalid serial digit '{}'", .0.escape_ascii())]
    InvalidSerialDigit(u8),

    /// A byte other than a digit or `;` appeared in the serial number.
    #[error("invalid header byte '{}'", .0.escape_ascii())]
    InvalidFormat(u8),

    /// The serial number does not fit in 32 bits.
    #[error("serial number out of range")]
    SerialOutOfRange,

    /// An explicit-size frame did not end with `;` at its declared length.
    #[error("bad frame trailer '{}' (expected ';')", .0.escape_ascii())]
    BadTrailer(u8),

    /// Appending would exceed the command buffer capacity.
    #[error("command buffer overflow ({len} + {additional} bytes, capacity {capacity})")]
    BufferOverflow {
        len: usize,
        additional: usize,
        capacity: usize,
    },

    /// An outgoing frame does not fit its length field or output buffer.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A response frame could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),

    /// The transport failed while writing a response.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl FrameError {
    /// Text reported to the host in the error response for this condition.
    pub fn response_text(&self) -> &'static str {
        match self {
            FrameError::InvalidSizeDigit(_) => "Invalid size digit",
            FrameError::InvalidSize(_) => "Invalid size",
            FrameError::InvalidSerialDigit(_) => "Invalid serial digit",
            FrameError::InvalidFormat(_) | FrameError::SerialOutOfRange => "Invalid format",
            FrameError::BadTrailer(_) => "bad cmd trailer",
            FrameError::BufferOverflow { .. } => "Input buffer size exceeded",
            FrameError::PayloadTooLarge { .. } => "Response too large",
            FrameError::MalformedResponse(_) => "Invalid response",
            FrameError::Transport(_) => "Transport error",
        }
    }

    /// True for the buffer-overflow condition.
    pub fn is_overflow(&self) -> bool {
        matches!(self, FrameError::BufferOverflow { .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
