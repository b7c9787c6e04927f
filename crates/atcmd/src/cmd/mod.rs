use clap::{Args, Subcommand};
use std::path::PathBuf;

use atcmd_frame::DEFAULT_BUFFER_CAPACITY;
use atcmd_parser::DEFAULT_QUEUE_CAPACITY;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod frame;
pub mod scan;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the parser with the demo command table.
    Serve(ServeArgs),
    /// Print a request frame as a host would send it.
    Frame(FrameArgs),
    /// Scan a byte capture and report every frame and framing error.
    Scan(ScanArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Frame(args) => frame::run(args, format),
        Command::Scan(args) => scan::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Serial device or FIFO to use instead of stdin/stdout.
    #[arg(long, env = "ATCMD_DEVICE", value_name = "PATH")]
    pub device: Option<PathBuf>,
    /// Echo received bytes back to the host.
    #[arg(long, env = "ATCMD_ECHO")]
    pub echo: bool,
    /// Command buffer capacity in bytes.
    #[arg(long, default_value_t = DEFAULT_BUFFER_CAPACITY)]
    pub capacity: usize,
    /// Depth of the message queue between the input thread and responder.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_depth: usize,
}

#[derive(Args, Debug)]
pub struct FrameArgs {
    /// Command name.
    pub name: String,
    /// Comma-separated command arguments.
    #[arg(long)]
    pub args: Option<String>,
    /// Request serial number.
    #[arg(long, default_value_t = 1)]
    pub serial: u32,
    /// Terminate with CR instead of declaring the body size.
    #[arg(long)]
    pub implicit: bool,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Capture file to scan. Reads stdin when omitted.
    pub file: Option<PathBuf>,
    /// Command buffer capacity in bytes.
    #[arg(long, default_value_t = DEFAULT_BUFFER_CAPACITY)]
    pub capacity: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show build details.
    #[arg(long)]
    pub extended: bool,
}
