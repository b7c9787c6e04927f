use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};

/// Default depth of the outbound message queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Create the bounded queue the parser hands messages to.
pub fn message_queue(capacity: usize) -> (Sender<Message>, Receiver<Message>) {
    crossbeam_channel::bounded(capacity)
}

/// A parsed command, produced by a handler and consumed by the application.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Id of the matched command table entry.
    pub command_id: u32,
    /// Serial number of the request frame.
    pub serial: u32,
    /// Handler-defined content.
    pub payload: Payload,
}

/// What a handler extracted from the command arguments.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    /// No arguments needed.
    #[default]
    Empty,
    /// Argument bytes exactly as received.
    Raw(Bytes),
    /// Arguments as one UTF-8 string.
    Text(String),
    /// Comma-separated argument fields.
    Fields(Vec<String>),
    /// Structured arguments.
    Json(serde_json::Value),
}

impl Message {
    pub fn new(command_id: u32, serial: u32) -> Self {
        Self {
            command_id,
            serial,
            payload: Payload::Empty,
        }
    }

    pub fn with_payload(command_id: u32, serial: u32, payload: Payload) -> Self {
        Self {
            command_id,
            serial,
            payload,
        }
    }

    /// Message carrying the raw argument bytes.
    pub fn raw(command_id: u32, serial: u32, args: &[u8]) -> Self {
        Self::with_payload(command_id, serial, Payload::Raw(Bytes::copy_from_slice(args)))
    }

    /// Message carrying the arguments as text; `None` if they are not UTF-8.
    pub fn text(command_id: u32, serial: u32, args: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(args).ok()?;
        Some(Self::with_payload(
            command_id,
            serial,
            Payload::Text(text.to_owned()),
        ))
    }

    /// Message carrying the comma-separated argument fields.
    pub fn fields(command_id: u32, serial: u32, args: &[u8]) -> Self {
        Self::with_payload(command_id, serial, Payload::Fields(split_fields(args)))
    }

    /// Message carrying arguments parsed as JSON; `None` if they do not parse.
    pub fn json(command_id: u32, serial: u32, args: &[u8]) -> Option<Self> {
        let value = serde_json::from_slice(args).ok()?;
        Some(Self::with_payload(command_id, serial, Payload::Json(value)))
    }
}

impl Payload {
    /// Borrow the payload as text when it is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Raw(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Empty => true,
            Payload::Raw(bytes) => bytes.is_empty(),
            Payload::Text(text) => text.is_empty(),
            Payload::Fields(fields) => fields.is_empty(),
            Payload::Json(value) => value.is_null(),
        }
    }
}

/// Split arguments on commas. Empty input yields no fields; invalid UTF-8 is
/// replaced.
pub fn split_fields(args: &[u8]) -> Vec<String> {
    if args.is_empty() {
        return Vec::new();
    }
    args.split(|&b| b == b',')
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect()
}
