//! AT command registry, dispatch and input loop.
//!
//! This is the layer applications talk to. Build an [`AtCommandParser`]
//! around a transport and a bounded message queue, register command tables,
//! start the input thread, and reply to the messages your handlers produce.
//!
//! ```no_run
//! use atcmd_parser::{message_queue, AtCommandParser, CommandDef, CommandTable, Message};
//! use atcmd_transport::FdTransport;
//!
//! # fn main() -> atcmd_parser::Result<()> {
//! let (tx, rx) = message_queue(8);
//! let parser = AtCommandParser::builder()
//!     .transport(FdTransport::stdio()?)
//!     .queue(tx)
//!     .build()?;
//!
//! parser.register_commands(CommandTable::new(vec![CommandDef::new(
//!     "PING",
//!     1,
//!     |id, serial, _args| Some(Message::new(id, serial)),
//! )]))?;
//!
//! let _input = parser.start()?;
//! while let Ok(msg) = rx.recv() {
//!     parser.send_response(msg.serial, 0, Some("PONG"))?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod input;
pub mod message;
pub mod parser;
pub mod registry;

pub use config::ParserConfig;
pub use dispatcher::{split_command, Dispatcher};
pub use error::{DispatchError, ParserError, Result};
pub use input::{ChunkReport, InputLoop};
pub use message::{message_queue, Message, Payload, DEFAULT_QUEUE_CAPACITY};
pub use parser::{AtCommandParser, InputThread, ParserBuilder};
pub use registry::{CommandDef, CommandTable, Handler, Registry};
