use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
    default_buffer_capacity: usize,
    default_queue_capacity: usize,
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if matches!(format, OutputFormat::Json) {
        print_json(&VersionOutput {
            name: "atcmd",
            version: env!("CARGO_PKG_VERSION"),
            target_os: std::env::consts::OS,
            target_arch: std::env::consts::ARCH,
            default_buffer_capacity: atcmd_frame::DEFAULT_BUFFER_CAPACITY,
            default_queue_capacity: atcmd_parser::DEFAULT_QUEUE_CAPACITY,
        });
        return Ok(SUCCESS);
    }

    if !args.extended {
        println!("atcmd {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: atcmd");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "default_buffer_capacity: {}",
        atcmd_frame::DEFAULT_BUFFER_CAPACITY
    );
    println!(
        "default_queue_capacity: {}",
        atcmd_parser::DEFAULT_QUEUE_CAPACITY
    );

    Ok(SUCCESS)
}
