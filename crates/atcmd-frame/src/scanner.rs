use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::buffer::CommandBuffer;
use crate::error::{FrameError, Result};

/// Literal that starts every request frame.
pub const PREFIX: &[u8; 3] = b"AT+";

/// Number of decimal digits in the size field.
pub const SIZE_DIGITS: usize = 4;

/// Ends the header and, in explicit mode, the frame.
pub const TERMINATOR: u8 = b';';

/// Largest size field an explicit frame may declare.
pub const MAX_DECLARED_SIZE: usize = 6000;

/// Default command buffer capacity: 6 KiB plus header slack.
pub const DEFAULT_BUFFER_CAPACITY: usize = 6 * 1024 + 40;

/// Smallest usable capacity: a minimal header plus a one-byte body.
pub const MIN_BUFFER_CAPACITY: usize = PREFIX.len() + SIZE_DIGITS + 4;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// How the end of a frame is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// Nonzero size field: the frame is exactly header plus declared bytes.
    Explicit,
    /// `0000` size field: the frame ends at a carriage return.
    Implicit,
}

/// A complete request frame as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Serial number parsed from the header.
    pub serial: u32,
    /// Framing mode used for this frame.
    pub mode: FrameMode,
    bytes: Bytes,
    header_len: usize,
}

impl RawFrame {
    /// All frame bytes from the prefix through the terminator (the CR of an
    /// implicit frame is not included, LF bytes were dropped).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Prefix, size field, serial and the header `;`.
    pub fn header(&self) -> &[u8] {
        &self.bytes[..self.header_len]
    }

    /// The `name[,args]` portion, without any frame terminator.
    pub fn body(&self) -> Bytes {
        let mut end = self.bytes.len();
        if self.bytes.last() == Some(&TERMINATOR) && end > self.header_len {
            end -= 1;
        }
        self.bytes.slice(self.header_len..end)
    }

    /// Value of the size field, which for explicit frames counts the body
    /// and its closing `;`.
    pub fn declared_size(&self) -> usize {
        match self.mode {
            FrameMode::Explicit => self.bytes.len() - self.header_len,
            FrameMode::Implicit => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Matching `AT+`; `matched` bytes of the prefix seen so far.
    Prefix { matched: usize },
    /// Reading the 4-digit size field.
    Size,
    /// Reading serial digits up to the header terminator.
    Serial { digits: usize },
    /// Reading the body; `total` is the full frame length in explicit mode.
    Body { total: Option<usize> },
}

enum Step {
    Continue,
    Complete(RawFrame),
}

/// Stateful request-frame scanner.
///
/// Bytes are consumed one at a time, so a frame may be split across any
/// number of calls and one call may carry several frames. Noise before a
/// prefix is skipped silently; every malformed frame is reported once and
/// scanning resumes with the next byte.
#[derive(Debug)]
pub struct FrameScanner {
    state: State,
    buf: CommandBuffer,
    declared_size: usize,
    serial: u32,
    header_len: usize,
}

impl FrameScanner {
    /// Create a scanner with a command buffer of `capacity` bytes.
    ///
    /// Capacities below [`MIN_BUFFER_CAPACITY`] are raised to it.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: State::Prefix { matched: 0 },
            buf: CommandBuffer::with_capacity(capacity.max(MIN_BUFFER_CAPACITY)),
            declared_size: 0,
            serial: 0,
            header_len: 0,
        }
    }

    /// Consume bytes from `src` until a frame completes.
    ///
    /// Returns `Ok(None)` once `src` is exhausted without a complete frame;
    /// partial progress is kept for the next call. On a framing error the
    /// scanner is reset and the error returned; unconsumed bytes stay in
    /// `src`.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        while let Some(&byte) = src.first() {
            src.advance(1);
            match self.step(byte) {
                Ok(Step::Continue) => {}
                Ok(Step::Complete(frame)) => {
                    if frame.mode == FrameMode::Explicit {
                        skip_whitespace(src);
                    }
                    return Ok(Some(frame));
                }
                Err(err) => {
                    debug!(error = %err, "discarding malformed frame");
                    self.reset();
                    return Err(err);
                }
            }
        }
        Ok(None)
    }

    /// Drop any partial frame and go back to scanning for the prefix.
    pub fn reset(&mut self) {
        self.state = State::Prefix { matched: 0 };
        self.buf.clear();
        self.declared_size = 0;
        self.serial = 0;
        self.header_len = 0;
    }

    /// True once a full prefix has been matched for the current frame.
    pub fn is_reading_frame(&self) -> bool {
        !matches!(self.state, State::Prefix { .. })
    }

    /// True while the size field or serial number is being read.
    pub fn in_header(&self) -> bool {
        matches!(self.state, State::Size | State::Serial { .. })
    }

    /// Bytes of the current frame buffered so far.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Size field of the current frame; once the header is complete this is
    /// the total frame length (0 for implicit frames).
    pub fn declared_size(&self) -> usize {
        match self.state {
            State::Body { total: Some(total) } => total,
            _ => self.declared_size,
        }
    }

    /// Command buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    fn step(&mut self, byte: u8) -> Result<Step> {
        match self.state {
            State::Prefix { matched } => self.scan_prefix(byte, matched),
            State::Size => {
                if !byte.is_ascii_digit() {
                    return Err(FrameError::InvalidSizeDigit(byte));
                }
                self.buf.push(byte)?;
                self.declared_size = self.declared_size * 10 + usize::from(byte - b'0');
                if self.buf.len() == PREFIX.len() + SIZE_DIGITS {
                    self.state = State::Serial { digits: 0 };
                }
                Ok(Step::Continue)
            }
            State::Serial { digits } => self.scan_serial(byte, digits),
            State::Body { total: Some(total) } => {
                self.buf.push(byte)?;
                if self.buf.len() < total {
                    return Ok(Step::Continue);
                }
                if byte != TERMINATOR {
                    return Err(FrameError::BadTrailer(byte));
                }
                Ok(Step::Complete(self.finish(FrameMode::Explicit)))
            }
            State::Body { total: None } => match byte {
                LF => Ok(Step::Continue),
                CR => Ok(Step::Complete(self.finish(FrameMode::Implicit))),
                _ => {
                    self.buf.push(byte)?;
                    Ok(Step::Continue)
                }
            },
        }
    }

    fn scan_prefix(&mut self, byte: u8, matched: usize) -> Result<Step> {
        if byte == PREFIX[matched] {
            self.buf.push(byte)?;
            if matched + 1 == PREFIX.len() {
                trace!("command start detected");
                self.state = State::Size;
            } else {
                self.state = State::Prefix {
                    matched: matched + 1,
                };
            }
        } else if matched > 0 && byte == PREFIX[0] {
            // The byte that broke this candidate may start the next one.
            self.buf.clear();
            self.buf.push(byte)?;
            self.state = State::Prefix { matched: 1 };
        } else {
            self.buf.clear();
            self.state = State::Prefix { matched: 0 };
        }
        Ok(Step::Continue)
    }

    fn scan_serial(&mut self, byte: u8, digits: usize) -> Result<Step> {
        if byte.is_ascii_digit() {
            self.serial = self
                .serial
                .checked_mul(10)
                .and_then(|serial| serial.checked_add(u32::from(byte - b'0')))
                .ok_or(FrameError::SerialOutOfRange)?;
            self.buf.push(byte)?;
            self.state = State::Serial { digits: digits + 1 };
            return Ok(Step::Continue);
        }

        if digits == 0 {
            return Err(FrameError::InvalidSerialDigit(byte));
        }
        if byte != TERMINATOR {
            return Err(FrameError::InvalidFormat(byte));
        }

        self.buf.push(byte)?;
        self.header_len = self.buf.len();

        if self.declared_size > MAX_DECLARED_SIZE {
            return Err(FrameError::InvalidSize(self.declared_size));
        }

        let total = if self.declared_size > 0 {
            let total = self.header_len + self.declared_size;
            if !self.buf.fits(self.declared_size) {
                return Err(FrameError::BufferOverflow {
                    len: self.header_len,
                    additional: self.declared_size,
                    capacity: self.buf.capacity(),
                });
            }
            Some(total)
        } else {
            None
        };

        debug!(
            serial = self.serial,
            total = total.unwrap_or(0),
            "frame header complete"
        );
        self.state = State::Body { total };
        Ok(Step::Continue)
    }

    fn finish(&mut self, mode: FrameMode) -> RawFrame {
        let frame = RawFrame {
            serial: self.serial,
            mode,
            bytes: self.buf.freeze(),
            header_len: self.header_len,
        };
        debug!(serial = frame.serial, len = frame.len(), ?mode, "frame complete");
        self.reset();
        frame
    }
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

fn skip_whitespace(src: &mut BytesMut) {
    let count = src
        .iter()
        .take_while(|byte| byte.is_ascii_whitespace())
        .count();
    src.advance(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(scanner: &mut FrameScanner, input: &[u8]) -> Vec<Result<RawFrame>> {
        let mut src = BytesMut::from(input);
        let mut out = Vec::new();
        loop {
            match scanner.decode(&mut src) {
                Ok(Some(frame)) => out.push(Ok(frame)),
                Ok(None) => break,
                Err(err) => out.push(Err(err)),
            }
        }
        out
    }

    fn frames(scanner: &mut FrameScanner, input: &[u8]) -> Vec<RawFrame> {
        scan_all(scanner, input)
            .into_iter()
            .map(|result| result.expect("frame should scan"))
            .collect()
    }

    #[test]
    fn explicit_frame_counts_body_and_terminator() {
        let mut scanner = FrameScanner::default();
        let out = frames(&mut scanner, b"AT+00115;ECHO,hello;");

        assert_eq!(out.len(), 1);
        let frame = &out[0];
        assert_eq!(frame.serial, 5);
        assert_eq!(frame.mode, FrameMode::Explicit);
        assert_eq!(frame.header(), b"AT+00115;");
        assert_eq!(frame.body().as_ref(), b"ECHO,hello");
        assert_eq!(frame.declared_size(), 11);
        assert_eq!(frame.len(), 9 + 11);
    }

    #[test]
    fn explicit_frame_waits_for_declared_length() {
        let mut scanner = FrameScanner::default();
        let mut src = BytesMut::from(&b"AT+00115;ECHO,hello"[..]);

        assert!(scanner.decode(&mut src).unwrap().is_none());
        assert!(scanner.is_reading_frame());
        assert!(!scanner.in_header());
        assert_eq!(scanner.declared_size(), 20);
        assert_eq!(scanner.buffered(), 19);

        src.extend_from_slice(b";");
        let frame = scanner.decode(&mut src).unwrap().unwrap();
        assert_eq!(frame.body().as_ref(), b"ECHO,hello");
        assert!(!scanner.is_reading_frame());
        assert_eq!(scanner.buffered(), 0);
    }

    #[test]
    fn explicit_frame_with_wrong_trailer_is_rejected() {
        let mut scanner = FrameScanner::default();
        let out = scan_all(&mut scanner, b"AT+00101;ECHO,hello;");

        // Ten declared bytes end on 'o', not ';'. The stray ';' is noise.
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(FrameError::BadTrailer(b'o'))));
        assert!(!scanner.is_reading_frame());
    }

    #[test]
    fn explicit_mode_keeps_line_feeds() {
        let mut scanner = FrameScanner::default();
        let out = frames(&mut scanner, b"AT+00062;A\nB\rC;");
        assert_eq!(out[0].body().as_ref(), b"A\nB\rC");
    }

    #[test]
    fn trailing_whitespace_after_explicit_frame_is_skipped() {
        let mut scanner = FrameScanner::default();
        let mut src = BytesMut::from(&b"AT+00051;PING;\r\n \tAT+"[..]);

        let frame = scanner.decode(&mut src).unwrap().unwrap();
        assert_eq!(frame.body().as_ref(), b"PING");
        assert_eq!(src.as_ref(), b"AT+");
    }

    #[test]
    fn implicit_frame_ends_at_carriage_return() {
        let mut scanner = FrameScanner::default();
        let out = frames(&mut scanner, b"AT+0000007;PING\r");

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].serial, 7);
        assert_eq!(out[0].mode, FrameMode::Implicit);
        assert_eq!(out[0].body().as_ref(), b"PING");
        assert_eq!(out[0].declared_size(), 0);
    }

    #[test]
    fn implicit_frame_drops_line_feeds() {
        let mut scanner = FrameScanner::default();
        let out = frames(&mut scanner, b"AT+0000007;\nPI\nNG,a\nb\r");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].body().as_ref(), b"PING,ab");
    }

    #[test]
    fn implicit_frame_trailing_terminator_is_stripped() {
        let mut scanner = FrameScanner::default();
        let out = frames(&mut scanner, b"AT+00003;ECHO,x;\r");
        assert_eq!(out[0].body().as_ref(), b"ECHO,x");
        assert_eq!(out[0].as_bytes(), b"AT+00003;ECHO,x;");
    }

    #[test]
    fn leading_noise_is_skipped() {
        let mut scanner = FrameScanner::default();
        let out = frames(&mut scanner, b"XAT+00051;PING;");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].body().as_ref(), b"PING");
    }

    #[test]
    fn repeated_prefix_start_resynchronizes() {
        let mut scanner = FrameScanner::default();
        let out = frames(&mut scanner, b"AAT+00051;PING;");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_bytes(), b"AT+00051;PING;");

        let out = frames(&mut scanner, b"ATAT+00052;PING;");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].serial, 2);
    }

    #[test]
    fn non_digit_size_is_rejected() {
        let mut scanner = FrameScanner::default();
        let out = scan_all(&mut scanner, b"AT+00x51;PING;AT+00053;PING;");

        assert!(matches!(out[0], Err(FrameError::InvalidSizeDigit(b'x'))));
        let good: Vec<_> = out.into_iter().filter_map(|r| r.ok()).collect();
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].serial, 3);
    }

    #[test]
    fn missing_serial_is_rejected() {
        let mut scanner = FrameScanner::default();
        let out = scan_all(&mut scanner, b"AT+0005;PING;");
        assert!(matches!(out[0], Err(FrameError::InvalidSerialDigit(b';'))));
        assert_eq!(out[0].as_ref().unwrap_err().response_text(), "Invalid serial digit");
    }

    #[test]
    fn bad_serial_byte_is_rejected() {
        let mut scanner = FrameScanner::default();
        let out = scan_all(&mut scanner, b"AT+000512,PING;");
        assert!(matches!(out[0], Err(FrameError::InvalidFormat(b','))));
    }

    #[test]
    fn serial_overflow_is_rejected() {
        let mut scanner = FrameScanner::default();
        let out = scan_all(&mut scanner, b"AT+000099999999999;PING\r");
        assert!(matches!(out[0], Err(FrameError::SerialOutOfRange)));
    }

    #[test]
    fn declared_size_beyond_capacity_overflows() {
        let mut scanner = FrameScanner::new(64);
        let out = scan_all(&mut scanner, b"AT+01001;");

        assert_eq!(out.len(), 1);
        let err = out[0].as_ref().unwrap_err();
        assert!(err.is_overflow());
        assert_eq!(err.response_text(), "Input buffer size exceeded");
        assert!(!scanner.is_reading_frame());

        let out = frames(&mut scanner, b"AT+00052;PING;");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].serial, 2);
    }

    #[test]
    fn declared_size_above_limit_is_rejected() {
        let mut wire = b"AT+61001;".to_vec();
        wire.extend(std::iter::repeat_n(b'X', 6099));
        wire.extend_from_slice(b";AT+00052;PING;");

        let mut scanner = FrameScanner::default();
        let out = scan_all(&mut scanner, &wire);

        let err = out[0].as_ref().unwrap_err();
        assert!(matches!(err, FrameError::InvalidSize(6100)));
        assert_eq!(err.response_text(), "Invalid size");
        assert!(!err.is_overflow());

        // The rejected body is noise; the next frame still scans.
        let good: Vec<_> = out.into_iter().filter_map(|r| r.ok()).collect();
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].serial, 2);
    }

    #[test]
    fn declared_size_at_limit_is_accepted() {
        let mut wire = b"AT+60001;".to_vec();
        wire.extend(std::iter::repeat_n(b'X', MAX_DECLARED_SIZE - 1));
        wire.push(b';');

        let mut scanner = FrameScanner::default();
        let out = frames(&mut scanner, &wire);
        assert_eq!(out[0].declared_size(), MAX_DECLARED_SIZE);
    }

    #[test]
    fn implicit_frame_overflow_resets() {
        let mut scanner = FrameScanner::new(16);
        let out = scan_all(&mut scanner, b"AT+00001;ABCDEFGHIJ\rAT+00002;OK\r");

        assert!(out[0].as_ref().unwrap_err().is_overflow());
        // The rest of the oversized body is noise until the next prefix.
        let good: Vec<_> = out.into_iter().filter_map(|r| r.ok()).collect();
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].body().as_ref(), b"OK");
    }

    #[test]
    fn frame_exactly_filling_usable_capacity_fits() {
        // Header "AT+00041;" is 9 bytes; 9 + 4 = 13 < 14.
        let mut scanner = FrameScanner::new(14);
        let out = frames(&mut scanner, b"AT+00041;ABC;");
        assert_eq!(out[0].body().as_ref(), b"ABC");

        let out = scan_all(&mut scanner, b"AT+00051;ABCD;");
        assert!(out[0].as_ref().unwrap_err().is_overflow());
    }

    #[test]
    fn chunk_splitting_is_transparent() {
        let wire: &[u8] = b"noiseAT+00115;ECHO,hello;AT+000042;PING\r\nAAT+00039;X,;";
        let mut whole = FrameScanner::default();
        let expected = frames(&mut whole, wire);
        assert_eq!(expected.len(), 3);

        for chunk_size in 1..wire.len() {
            let mut scanner = FrameScanner::default();
            let mut src = BytesMut::new();
            let mut got = Vec::new();
            for chunk in wire.chunks(chunk_size) {
                src.extend_from_slice(chunk);
                while let Some(frame) = scanner.decode(&mut src).unwrap() {
                    got.push(frame);
                }
            }
            assert_eq!(got, expected, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn multiple_frames_in_one_buffer() {
        let mut scanner = FrameScanner::default();
        let out = frames(&mut scanner, b"AT+00051;PING;AT+00052;PONG;AT+00003;ECHO\r");
        let serials: Vec<u32> = out.iter().map(|f| f.serial).collect();
        assert_eq!(serials, vec![1, 2, 3]);
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut scanner = FrameScanner::default();
        let mut src = BytesMut::from(&b"AT+00"[..]);
        assert!(scanner.decode(&mut src).unwrap().is_none());
        assert!(scanner.in_header());

        scanner.reset();
        assert!(!scanner.is_reading_frame());
        assert_eq!(scanner.buffered(), 0);
    }
}
