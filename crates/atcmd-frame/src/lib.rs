//! AT command frame scanning and response encoding.
//!
//! Request frames arrive as `AT+SSSSNNNN;body` where `SSSS` is a 4-digit
//! body length (or `0000` for carriage-return termination) and `NNNN` is the
//! serial number. Responses go back as `+S`/`+H` frames with a 4-digit
//! payload length.
//!
//! The scanner keeps its state between calls, so callers can feed bytes in
//! whatever chunks the transport hands them.

pub mod buffer;
pub mod error;
pub mod request;
pub mod response;
pub mod scanner;

pub use buffer::CommandBuffer;
pub use error::{FrameError, Result};
pub use request::encode_request;
pub use response::{
    decode_response, encode_response, Response, ResponseEncoder, MAX_PAYLOAD_FIELD, STATUS_ERROR,
    STATUS_OK,
};
pub use scanner::{
    FrameMode, FrameScanner, RawFrame, DEFAULT_BUFFER_CAPACITY, MAX_DECLARED_SIZE,
    MIN_BUFFER_CAPACITY, PREFIX, SIZE_DIGITS, TERMINATOR,
};
