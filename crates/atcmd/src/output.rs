use std::io::{IsTerminal, Write};

use atcmd_frame::{FrameError, FrameMode, RawFrame};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct RequestOutput<'a> {
    serial: u32,
    mode: &'static str,
    len: usize,
    frame: &'a str,
}

/// Print an encoded request frame.
pub fn print_request(frame: &[u8], serial: u32, mode: FrameMode, format: OutputFormat) {
    let text = escape(frame);
    match format {
        OutputFormat::Json => {
            let out = RequestOutput {
                serial,
                mode: mode_name(mode),
                len: frame.len(),
                frame: &text,
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["SERIAL", "MODE", "LEN", "FRAME"]);
            table.add_row(vec![
                serial.to_string(),
                mode_name(mode).to_string(),
                frame.len().to_string(),
                text,
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{text}"),
        OutputFormat::Raw => print_raw(frame),
    }
}

/// One scanner outcome for a byte capture.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanEvent {
    Frame {
        serial: u32,
        mode: &'static str,
        body: String,
    },
    Error {
        response: &'static str,
        detail: String,
    },
}

impl ScanEvent {
    pub fn frame(frame: &RawFrame) -> Self {
        ScanEvent::Frame {
            serial: frame.serial,
            mode: mode_name(frame.mode),
            body: escape(&frame.body()),
        }
    }

    pub fn error(err: &FrameError) -> Self {
        ScanEvent::Error {
            response: err.response_text(),
            detail: err.to_string(),
        }
    }
}

pub fn print_scan_events(events: &[ScanEvent], format: OutputFormat) {
    match format {
        OutputFormat::Json => events.iter().for_each(print_json),
        OutputFormat::Table => {
            let mut table = new_table(vec!["KIND", "SERIAL", "MODE", "DETAIL"]);
            for event in events {
                table.add_row(match event {
                    ScanEvent::Frame { serial, mode, body } => vec![
                        "frame".to_string(),
                        serial.to_string(),
                        mode.to_string(),
                        body.clone(),
                    ],
                    ScanEvent::Error { response, detail } => vec![
                        "error".to_string(),
                        "0".to_string(),
                        String::new(),
                        format!("{response} ({detail})"),
                    ],
                });
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for event in events {
                match event {
                    ScanEvent::Frame { serial, mode, body } => {
                        println!("frame serial={serial} mode={mode} body={body}")
                    }
                    ScanEvent::Error { response, detail } => {
                        println!("error response=\"{response}\" detail={detail}")
                    }
                }
            }
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn mode_name(mode: FrameMode) -> &'static str {
    match mode {
        FrameMode::Explicit => "explicit",
        FrameMode::Implicit => "implicit",
    }
}

/// Printable form of frame bytes; CR, LF and non-ASCII bytes are escaped.
pub fn escape(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}
