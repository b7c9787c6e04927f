use std::io::Read;

use atcmd_frame::FrameScanner;
use bytes::BytesMut;
use tracing::debug;

use crate::cmd::ScanArgs;
use crate::exit::{io_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_scan_events, OutputFormat, ScanEvent};

pub fn run(args: ScanArgs, format: OutputFormat) -> CliResult<i32> {
    let data = match &args.file {
        Some(path) => std::fs::read(path)
            .map_err(|err| io_error(&format!("read {}", path.display()), err))?,
        None => {
            let mut data = Vec::new();
            std::io::stdin()
                .read_to_end(&mut data)
                .map_err(|err| io_error("read stdin", err))?;
            data
        }
    };

    let events = scan(&data, args.capacity);
    let errors = events
        .iter()
        .filter(|event| matches!(event, ScanEvent::Error { .. }))
        .count();
    debug!(
        bytes = data.len(),
        events = events.len(),
        errors,
        "capture scanned"
    );

    print_scan_events(&events, format);
    Ok(if errors == 0 { SUCCESS } else { DATA_INVALID })
}

fn scan(data: &[u8], capacity: usize) -> Vec<ScanEvent> {
    let mut scanner = FrameScanner::new(capacity);
    let mut src = BytesMut::from(data);
    let mut events = Vec::new();

    loop {
        match scanner.decode(&mut src) {
            Ok(Some(frame)) => events.push(ScanEvent::frame(&frame)),
            Ok(None) => break,
            Err(err) => events.push(ScanEvent::error(&err)),
        }
    }
    events
}
