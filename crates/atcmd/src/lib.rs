//! AT command framing, dispatch and response protocol.
//!
//! atcmd lets a device accept `AT+` command frames from a host over a byte
//! stream, route each one to a registered handler, and answer with framed
//! synchronous or asynchronous responses.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte transport abstraction (fd/serial, closures, loopback)
//! - [`frame`]: request frame scanning and response encoding
//! - [`parser`]: command registry, dispatch, input loop and parser handle

/// Re-export transport types.
pub mod transport {
    pub use atcmd_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use atcmd_frame::*;
}

/// Re-export parser types.
pub mod parser {
    pub use atcmd_parser::*;
}
