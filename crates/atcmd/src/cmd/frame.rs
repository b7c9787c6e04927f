use atcmd_frame::{encode_request, FrameMode};
use bytes::BytesMut;

use crate::cmd::FrameArgs;
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_request, OutputFormat};

pub fn run(args: FrameArgs, format: OutputFormat) -> CliResult<i32> {
    if args.name.is_empty() || args.name.contains([',', ';', '\r']) {
        return Err(CliError::new(
            USAGE,
            format!("invalid command name {:?}", args.name),
        ));
    }

    let mode = if args.implicit {
        FrameMode::Implicit
    } else {
        FrameMode::Explicit
    };

    let mut wire = BytesMut::new();
    encode_request(args.serial, &args.name, args.args.as_deref(), mode, &mut wire)
        .map_err(|err| frame_error("encode failed", err))?;

    print_request(&wire, args.serial, mode, format);
    Ok(SUCCESS)
}
