use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atcmd_frame::{STATUS_ERROR, STATUS_OK};
use atcmd_parser::{
    message_queue, AtCommandParser, CommandDef, CommandTable, Message, ParserConfig, ParserError,
};
use atcmd_transport::{FdTransport, Transport, TransportError};
use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{parser_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};

const PING: u32 = 1;
const ECHO: u32 = 2;
const VERSION: u32 = 3;

const RESPONDER_POLL: Duration = Duration::from_millis(50);

/// Commands served by `atcmd serve`.
pub fn demo_commands() -> CommandTable {
    CommandTable::new(vec![
        CommandDef::new("PING", PING, |id, serial, _| Some(Message::new(id, serial))),
        CommandDef::new("ECHO", ECHO, |id, serial, args| {
            Some(Message::raw(id, serial, args))
        }),
        CommandDef::new("VERSION", VERSION, |id, serial, args| {
            args.is_empty().then(|| Message::new(id, serial))
        }),
    ])
}

/// Status and text sent back for a message produced by the demo table.
pub fn reply_for(msg: &Message) -> (u32, Option<String>) {
    match msg.command_id {
        PING => (STATUS_OK, Some("PONG".to_string())),
        ECHO => (STATUS_OK, msg.payload.as_text().map(str::to_string)),
        VERSION => (STATUS_OK, Some(env!("CARGO_PKG_VERSION").to_string())),
        _ => (STATUS_ERROR, Some("Invalid command".to_string())),
    }
}

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let transport: Arc<dyn Transport> = match &args.device {
        Some(path) => Arc::new(
            FdTransport::open(path).map_err(|err| transport_error("open failed", err))?,
        ),
        None => Arc::new(
            FdTransport::stdio().map_err(|err| transport_error("stdio setup failed", err))?,
        ),
    };

    let (tx, rx) = message_queue(args.queue_depth.max(1));
    let config = ParserConfig {
        buffer_capacity: args.capacity,
        echo: args.echo,
        ..ParserConfig::default()
    };
    let parser = AtCommandParser::builder()
        .shared_transport(transport)
        .queue(tx)
        .config(config)
        .build()
        .map_err(|err| parser_error("parser setup failed", err))?;
    parser
        .register_commands(demo_commands())
        .map_err(|err| parser_error("register failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let input = parser
        .start()
        .map_err(|err| parser_error("input thread failed", err))?;
    info!(
        device = ?args.device,
        capacity = args.capacity,
        echo = args.echo,
        "serving AT commands"
    );

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(RESPONDER_POLL) {
            Ok(msg) => respond(&parser, &msg),
            Err(RecvTimeoutError::Timeout) => {
                if input.is_finished() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    match input.join() {
        Ok(()) | Err(ParserError::Transport(TransportError::Closed)) => {
            info!("input closed, shutting down");
            Ok(SUCCESS)
        }
        Err(err) => Err(parser_error("input loop failed", err)),
    }
}

fn respond(parser: &AtCommandParser, msg: &Message) {
    let (status, text) = reply_for(msg);
    debug!(
        serial = msg.serial,
        command_id = msg.command_id,
        status,
        "replying"
    );
    if let Err(err) = parser.send_response(msg.serial, status, text.as_deref()) {
        warn!(serial = msg.serial, error = %err, "response failed");
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
