use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Library crates that log per byte chunk or per frame.
const WIRE_TARGETS: [&str; 2] = ["atcmd_frame", "atcmd_transport"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Level used when `--log-level` is not given.
///
/// `serve` on stdio shares the terminal with the host driving it, so only
/// warnings and errors are printed there.
pub fn default_level(serving_stdio: bool) -> LogLevel {
    if serving_stdio {
        LogLevel::Warn
    } else {
        LogLevel::Info
    }
}

/// Per-target filter: `debug` shows command flow from the parser and CLI,
/// frame and transport detail needs `trace`.
pub fn targets_for(level: LogLevel) -> Targets {
    let wire = match level {
        LogLevel::Trace => LevelFilter::TRACE,
        other => other.as_filter().min(LevelFilter::INFO),
    };
    WIRE_TARGETS
        .iter()
        .fold(Targets::new().with_default(level.as_filter()), |targets, target| {
            targets.with_target(*target, wire)
        })
}

/// Install the stderr subscriber. Stdout stays clean for frame output and for
/// `serve` running over stdio.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);
    let targets = targets_for(level);

    match format {
        LogFormat::Text => {
            let _ = builder.finish().with(targets).try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().finish().with(targets).try_init();
        }
    }
}
