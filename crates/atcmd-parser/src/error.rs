/// Errors from command lookup and handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No registered table has a command with this name.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    /// The handler returned no message.
    #[error("command {name:?} (id {id}) rejected by handler")]
    Rejected { name: String, id: u32 },
}

impl DispatchError {
    /// Text reported to the host in the error response.
    pub fn response_text(&self) -> &'static str {
        match self {
            DispatchError::UnknownCommand(_) => "Invalid cmd",
            DispatchError::Rejected { .. } => "Command rejected",
        }
    }
}

/// Errors that can occur in parser operations.
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    /// Invalid argument or configuration.
    #[error("bad parameter: {0}")]
    BadParam(&'static str),

    /// Registry storage could not be allocated.
    #[error("out of memory registering command table")]
    NoMemory,

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] atcmd_frame::FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] atcmd_transport::TransportError),

    /// Command lookup or handler failure.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// The message queue stayed full for the whole handoff timeout.
    #[error("message queue full after {0:?}")]
    QueueTimeout(std::time::Duration),

    /// The message queue receiver was dropped.
    #[error("message queue disconnected")]
    QueueDisconnected,

    /// The input thread could not be started.
    #[error("failed to spawn input thread: {0}")]
    Spawn(std::io::Error),

    /// The input thread panicked.
    #[error("input thread panicked")]
    InputPanicked,
}

pub type Result<T> = std::result::Result<T, ParserError>;
