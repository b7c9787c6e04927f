use std::time::Duration;

use atcmd_frame::{DEFAULT_BUFFER_CAPACITY, MIN_BUFFER_CAPACITY};

use crate::error::{ParserError, Result};

/// Default number of bytes requested from the transport per read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64;

/// Default sleep between readiness polls when no input is waiting.
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_millis(1);

/// Default time to wait for room in the message queue.
pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_millis(200);

/// Parser tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Capacity of the command buffer and of the response output buffer.
    pub buffer_capacity: usize,
    /// Bytes requested per transport read.
    pub read_chunk_size: usize,
    /// Sleep when the transport reports no input.
    pub idle_delay: Duration,
    /// How long a completed message may wait for queue space.
    pub queue_timeout: Duration,
    /// Echo every received chunk back to the host before parsing it.
    pub echo: bool,
}

impl ParserConfig {
    /// Reject configurations the input loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity < MIN_BUFFER_CAPACITY {
            return Err(ParserError::BadParam("buffer capacity below minimum frame size"));
        }
        if self.read_chunk_size == 0 {
            return Err(ParserError::BadParam("read chunk size must be nonzero"));
        }
        Ok(())
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            idle_delay: DEFAULT_IDLE_DELAY,
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
            echo: false,
        }
    }
}
