use std::sync::{Arc, Mutex, MutexGuard};

use atcmd_transport::Transport;
use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use crate::error::{FrameError, Result};
use crate::scanner::{DEFAULT_BUFFER_CAPACITY, SIZE_DIGITS, TERMINATOR};

/// Status for a successful synchronous response.
pub const STATUS_OK: u32 = 0;

/// Status the parser reports for framing, lookup and queue failures.
pub const STATUS_ERROR: u32 = 1;

/// Largest payload the 4-digit length field can describe.
pub const MAX_PAYLOAD_FIELD: usize = 9999;

const SYNC_TAG: u8 = b'S';
const ASYNC_TAG: u8 = b'H';
const LINE_END: &[u8; 2] = b"\r\n";

/// A response frame sent to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Status reply correlated with a request serial.
    Sync {
        serial: u32,
        status: u32,
        text: Option<String>,
    },
    /// Unsolicited push, still serial-tagged.
    Async { serial: u32, text: String },
}

impl Response {
    pub fn sync(serial: u32, status: u32, text: Option<&str>) -> Self {
        Response::Sync {
            serial,
            status,
            text: text.map(str::to_owned),
        }
    }

    pub fn asynchronous(serial: u32, text: impl Into<String>) -> Self {
        Response::Async {
            serial,
            text: text.into(),
        }
    }

    pub fn serial(&self) -> u32 {
        match self {
            Response::Sync { serial, .. } | Response::Async { serial, .. } => *serial,
        }
    }
}

/// Encode a response frame into `dst`.
///
/// Wire format:
/// ```text
/// ┌────┬────────┬───┬────────┬───┬─────────────────┬───┬──────┐
/// │ +S │ SSSS   │ , │ serial │ ; │ status[,text]   │ ; │ CRLF │
/// │ +H │ (len)  │   │        │   │ text            │   │      │
/// └────┴────────┴───┴────────┴───┴─────────────────┴───┴──────┘
/// ```
/// `SSSS` is the zero-padded payload length, not counting either `;`.
/// Nothing is left in `dst` when the frame would exceed `max_len` bytes.
pub fn encode_response(response: &Response, dst: &mut BytesMut, max_len: usize) -> Result<()> {
    let start = dst.len();
    let tag = match response {
        Response::Sync { .. } => SYNC_TAG,
        Response::Async { .. } => ASYNC_TAG,
    };

    dst.put_u8(b'+');
    dst.put_u8(tag);
    let size_at = dst.len();
    dst.put_slice(b"0000");
    dst.put_u8(b',');
    dst.put_slice(response.serial().to_string().as_bytes());
    dst.put_u8(TERMINATOR);

    let payload_at = dst.len();
    match response {
        Response::Sync { status, text, .. } => {
            dst.put_slice(status.to_string().as_bytes());
            if let Some(text) = text.as_deref().filter(|text| !text.is_empty()) {
                dst.put_u8(b',');
                dst.put_slice(text.as_bytes());
            }
        }
        Response::Async { text, .. } => dst.put_slice(text.as_bytes()),
    }

    let payload_len = dst.len() - payload_at;
    if payload_len > MAX_PAYLOAD_FIELD {
        dst.truncate(start);
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: MAX_PAYLOAD_FIELD,
        });
    }
    dst[size_at..size_at + SIZE_DIGITS].copy_from_slice(format!("{payload_len:04}").as_bytes());

    dst.put_u8(TERMINATOR);
    dst.put_slice(LINE_END);

    let frame_len = dst.len() - start;
    if frame_len > max_len {
        dst.truncate(start);
        return Err(FrameError::PayloadTooLarge {
            size: frame_len,
            max: max_len,
        });
    }
    Ok(())
}

/// Decode one response frame from the front of `src`.
///
/// Returns `Ok(None)` when `src` holds only part of a frame, otherwise the
/// response and the number of bytes it occupied.
pub fn decode_response(src: &[u8]) -> Result<Option<(Response, usize)>> {
    const HEADER_MIN: usize = 2 + SIZE_DIGITS + 1;
    if src.len() < HEADER_MIN {
        return Ok(None);
    }
    if src[0] != b'+' {
        return Err(FrameError::MalformedResponse("missing '+' start"));
    }
    let tag = src[1];
    if tag != SYNC_TAG && tag != ASYNC_TAG {
        return Err(FrameError::MalformedResponse("unknown response type"));
    }

    let size_field = &src[2..2 + SIZE_DIGITS];
    let payload_len = parse_decimal(size_field)
        .ok_or(FrameError::MalformedResponse("invalid size field"))? as usize;
    if src[2 + SIZE_DIGITS] != b',' {
        return Err(FrameError::MalformedResponse("missing ',' after size"));
    }

    let serial_at = HEADER_MIN;
    let Some(serial_len) = src[serial_at..].iter().position(|&b| b == TERMINATOR) else {
        return Ok(None);
    };
    let serial = parse_decimal(&src[serial_at..serial_at + serial_len])
        .ok_or(FrameError::MalformedResponse("invalid serial"))?;

    let payload_at = serial_at + serial_len + 1;
    let total = payload_at + payload_len + 1 + LINE_END.len();
    if src.len() < total {
        return Ok(None);
    }
    let payload = &src[payload_at..payload_at + payload_len];
    if src[payload_at + payload_len] != TERMINATOR {
        return Err(FrameError::MalformedResponse("payload length mismatch"));
    }
    if &src[total - LINE_END.len()..total] != LINE_END {
        return Err(FrameError::MalformedResponse("missing line ending"));
    }

    let text = std::str::from_utf8(payload)
        .map_err(|_| FrameError::MalformedResponse("payload is not utf-8"))?;
    let response = if tag == ASYNC_TAG {
        Response::asynchronous(serial, text)
    } else {
        let (status, text) = match text.split_once(',') {
            Some((status, text)) => (status, Some(text)),
            None => (text, None),
        };
        let status = parse_decimal(status.as_bytes())
            .ok_or(FrameError::MalformedResponse("invalid status"))?;
        Response::sync(serial, status, text)
    };
    Ok(Some((response, total)))
}

fn parse_decimal(digits: &[u8]) -> Option<u32> {
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0u32, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add(u32::from(b - b'0'))
    })
}

/// Serializes response frames onto a shared transport.
///
/// One output buffer is shared by every caller. Building a frame and writing
/// it happen under the same lock, so frames from concurrent callers never
/// interleave on the wire. A stuck transport write blocks all other callers
/// until it returns.
pub struct ResponseEncoder {
    transport: Arc<dyn Transport>,
    output: Mutex<BytesMut>,
    capacity: usize,
}

impl ResponseEncoder {
    /// Create an encoder with the default output capacity.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_capacity(transport, DEFAULT_BUFFER_CAPACITY)
    }

    /// Create an encoder whose frames may be at most `capacity` bytes.
    pub fn with_capacity(transport: Arc<dyn Transport>, capacity: usize) -> Self {
        Self {
            transport,
            output: Mutex::new(BytesMut::with_capacity(capacity)),
            capacity,
        }
    }

    /// Encode and write one response frame. Write failures are returned,
    /// not retried.
    pub fn send(&self, response: &Response) -> Result<()> {
        let mut output = self.lock_output();
        output.clear();
        encode_response(response, &mut output, self.capacity)?;

        trace!(serial = response.serial(), len = output.len(), "writing response");
        let result = self.transport.write(&output);
        output.clear();

        if let Err(err) = &result {
            debug!(serial = response.serial(), error = %err, "response write failed");
        }
        result.map_err(FrameError::from)
    }

    /// Send a synchronous status response.
    pub fn send_sync(&self, serial: u32, status: u32, text: Option<&str>) -> Result<()> {
        self.send(&Response::sync(serial, status, text))
    }

    /// Send an asynchronous response.
    pub fn send_async(&self, serial: u32, text: &str) -> Result<()> {
        self.send(&Response::asynchronous(serial, text))
    }

    /// Write bytes verbatim, serialized with response frames.
    pub fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        let _output = self.lock_output();
        self.transport.write(bytes).map_err(FrameError::from)
    }

    /// Largest frame this encoder will write.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn lock_output(&self) -> MutexGuard<'_, BytesMut> {
        // The buffer is cleared before every use, so a panic mid-encode
        // leaves nothing worth discarding.
        self.output
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ResponseEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEncoder")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
