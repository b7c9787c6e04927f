use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use atcmd_frame::{decode_response, Response};
use atcmd_parser::{
    message_queue, AtCommandParser, CommandDef, CommandTable, InputLoop, Message, ParserConfig,
    Payload,
};
use atcmd_transport::{MemoryTransport, Transport};
use crossbeam_channel::Receiver;

const PING: u32 = 1;
const ECHO: u32 = 2;
const SET: u32 = 3;

fn commands() -> CommandTable {
    CommandTable::new(vec![
        CommandDef::new("PING", PING, |id, serial, _| Some(Message::new(id, serial))),
        CommandDef::new("ECHO", ECHO, |id, serial, args| {
            Some(Message::raw(id, serial, args))
        }),
        CommandDef::new("SET", SET, |id, serial, args| {
            Some(Message::fields(id, serial, args)).filter(|m| !m.payload.is_empty())
        }),
    ])
}

struct Rig {
    parser: AtCommandParser,
    input: InputLoop,
    transport: Arc<MemoryTransport>,
    rx: Receiver<Message>,
}

fn rig_with(config: ParserConfig, queue_capacity: usize) -> Rig {
    let transport = Arc::new(MemoryTransport::new());
    let (tx, rx) = message_queue(queue_capacity);
    let parser = AtCommandParser::builder()
        .shared_transport(transport.clone())
        .queue(tx)
        .config(config)
        .build()
        .unwrap();
    parser.register_commands(commands()).unwrap();
    let input = parser.input_loop().unwrap();
    Rig {
        parser,
        input,
        transport,
        rx,
    }
}

fn rig() -> Rig {
    rig_with(ParserConfig::default(), 16)
}

fn drain(rx: &Receiver<Message>) -> Vec<Message> {
    rx.try_iter().collect()
}

#[test]
fn explicit_command_with_arguments() {
    let mut rig = rig();
    rig.input.process_chunk(b"AT+00115;ECHO,hello;");

    let msgs = drain(&rig.rx);
    assert_eq!(msgs.len(), 1);
    assert_eq!((msgs[0].command_id, msgs[0].serial), (ECHO, 5));
    assert_eq!(msgs[0].payload.as_text(), Some("hello"));
    assert!(rig.transport.output().is_empty());
}

#[test]
fn implicit_command_ignores_line_feeds() {
    let mut rig = rig();
    rig.input.process_chunk(b"AT+0000007;PI\nNG\r");

    let msgs = drain(&rig.rx);
    assert_eq!(msgs.len(), 1);
    assert_eq!((msgs[0].command_id, msgs[0].serial), (PING, 7));
}

#[test]
fn noise_and_partial_prefixes_are_skipped() {
    let mut rig = rig();
    rig.input
        .process_chunk(b"garbage\r\nXAT+00001;PING\rAAT+00002;PING\rATAT+00003;PING\r");

    let serials: Vec<u32> = drain(&rig.rx).iter().map(|m| m.serial).collect();
    assert_eq!(serials, vec![1, 2, 3]);
    assert!(rig.transport.output().is_empty());
}

#[test]
fn restarted_prefix_yields_exactly_one_frame() {
    let mut rig = rig();
    let first = rig.input.process_chunk(b"XAT+0004");
    let second = rig.input.process_chunk(b"8;ABC;");
    assert_eq!(first.frames + second.frames, 1);

    let report = rig.input.process_chunk(b"AAT+00049;ABC;");
    assert_eq!(report.frames, 1);

    assert_eq!(
        rig.transport.writes(),
        vec![
            b"+S0013,8;1,Invalid cmd;\r\n".to_vec(),
            b"+S0013,9;1,Invalid cmd;\r\n".to_vec(),
        ]
    );
}

#[test]
fn whitespace_between_explicit_frames() {
    let mut rig = rig();
    rig.input
        .process_chunk(b"AT+00051;PING;\r\n  \tAT+00062;SET,a;\r\n");

    let msgs = drain(&rig.rx);
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[1].payload, Payload::Fields(vec!["a".into()]));
    assert!(rig.transport.output().is_empty());
}

#[test]
fn split_points_do_not_change_results() {
    let stream: &[u8] =
        b"noiseAT+00115;ECHO,hello;AT+0000007;PI\nNG\rAT+000099;NOPE\rAAT+00083;SET,x,y;";

    let run = |chunk_size: usize| {
        let mut rig = rig();
        for chunk in stream.chunks(chunk_size) {
            rig.input.process_chunk(chunk);
        }
        (drain(&rig.rx), rig.transport.output())
    };

    let (expected_msgs, expected_out) = run(stream.len());
    assert_eq!(expected_msgs.len(), 3);
    assert_eq!(expected_out, b"+S0013,99;1,Invalid cmd;\r\n");

    for size in 1..stream.len() {
        let (msgs, out) = run(size);
        assert_eq!(msgs, expected_msgs, "chunk size {size}");
        assert_eq!(out, expected_out, "chunk size {size}");
    }
}

#[test]
fn header_errors_answer_with_serial_zero() {
    let mut rig = rig();
    rig.input.process_chunk(b"AT+12a4");
    rig.input.process_chunk(b"AT+0000;PING\r");
    rig.input.process_chunk(b"AT+00001x");
    rig.input.process_chunk(b"AT+00054;PINGX");

    assert_eq!(
        rig.transport.writes(),
        vec![
            b"+S0020,0;1,Invalid size digit;\r\n".to_vec(),
            b"+S0022,0;1,Invalid serial digit;\r\n".to_vec(),
            b"+S0016,0;1,Invalid format;\r\n".to_vec(),
            b"+S0017,0;1,bad cmd trailer;\r\n".to_vec(),
        ]
    );
    assert!(drain(&rig.rx).is_empty());
}

#[test]
fn overflow_is_reported_and_parser_recovers() {
    let config = ParserConfig {
        buffer_capacity: 48,
        ..ParserConfig::default()
    };
    let mut rig = rig_with(config, 4);

    let report = rig.input.process_chunk(b"AT+01001;");
    assert_eq!((report.errors, report.overflows), (1, 1));
    rig.input.process_chunk(b"0123456789");
    rig.input.process_chunk(b"AT+00002;PING\r");

    assert_eq!(
        rig.transport.output(),
        b"+S0028,0;1,Input buffer size exceeded;\r\n"
    );
    let msgs = drain(&rig.rx);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].serial, 2);
}

#[test]
fn unbounded_implicit_frame_overflows() {
    let config = ParserConfig {
        buffer_capacity: 48,
        ..ParserConfig::default()
    };
    let mut rig = rig_with(config, 4);

    let report = rig
        .input
        .process_chunk(b"AT+00003;ECHO,this argument list is far too long for the buffer\r");
    assert_eq!((report.errors, report.overflows), (1, 1));
    assert_eq!(
        rig.transport.output(),
        b"+S0028,0;1,Input buffer size exceeded;\r\n"
    );
    assert!(drain(&rig.rx).is_empty());
}

#[test]
fn oversized_declaration_answers_invalid_size() {
    let mut rig = rig();

    let report = rig.input.process_chunk(b"AT+99991;");
    assert_eq!((report.errors, report.overflows), (1, 0));
    rig.input.process_chunk(b"AT+00002;PING\r");

    assert_eq!(
        rig.transport.output(),
        b"+S0014,0;1,Invalid size;\r\n"
    );
    let msgs = drain(&rig.rx);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].serial, 2);
}

#[test]
fn dispatch_errors_echo_request_serial() {
    let mut rig = rig();
    rig.input.process_chunk(b"AT+000031;PINGALL\r");
    rig.input.process_chunk(b"AT+000032;SET\r");

    assert_eq!(
        rig.transport.writes(),
        vec![
            b"+S0013,31;1,Invalid cmd;\r\n".to_vec(),
            b"+S0018,32;1,Command rejected;\r\n".to_vec(),
        ]
    );
}

#[test]
fn earlier_table_wins() {
    let mut rig = rig();
    rig.parser
        .register_commands(CommandTable::new(vec![CommandDef::new(
            "PING",
            99,
            |id, serial, _| Some(Message::new(id, serial)),
        )]))
        .unwrap();

    rig.input.process_chunk(b"AT+00001;PING\r");
    assert_eq!(drain(&rig.rx)[0].command_id, PING);
}

#[test]
fn full_queue_reports_queue_error() {
    let config = ParserConfig {
        queue_timeout: Duration::from_millis(10),
        ..ParserConfig::default()
    };
    let mut rig = rig_with(config, 1);

    rig.input.process_chunk(b"AT+00001;PING\rAT+00002;PING\r");

    assert_eq!(rig.transport.output(), b"+S0013,2;1,queue error;\r\n");
    let msgs = drain(&rig.rx);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].serial, 1);
}

#[test]
fn dropped_receiver_reports_queue_error() {
    let Rig {
        mut input,
        transport,
        rx,
        ..
    } = rig();
    drop(rx);

    input.process_chunk(b"AT+00004;PING\r");
    assert_eq!(transport.output(), b"+S0013,4;1,queue error;\r\n");
}

#[test]
fn echo_mode_repeats_input() {
    let config = ParserConfig {
        echo: true,
        ..ParserConfig::default()
    };
    let mut rig = rig_with(config, 4);

    rig.input.process_chunk(b"AT+0");
    rig.input.process_chunk(b"0001;PING\r");

    assert_eq!(rig.transport.output(), b"AT+00001;PING\r");
    assert_eq!(drain(&rig.rx).len(), 1);
}

/// Writes one byte at a time, yielding in between, so unserialized writers
/// would interleave.
#[derive(Default)]
struct TricklingTransport {
    wire: Mutex<Vec<u8>>,
}

impl Transport for TricklingTransport {
    fn is_data_ready(&self) -> bool {
        false
    }

    fn read(&self, _buf: &mut [u8]) -> atcmd_transport::Result<usize> {
        Ok(0)
    }

    fn write(&self, buf: &[u8]) -> atcmd_transport::Result<()> {
        for &byte in buf {
            self.wire.lock().unwrap().push(byte);
            thread::yield_now();
        }
        Ok(())
    }
}

#[test]
fn concurrent_responses_never_interleave() {
    const THREADS: u32 = 4;
    const PER_THREAD: u32 = 25;

    let transport = Arc::new(TricklingTransport::default());
    let (tx, _rx) = message_queue(1);
    let parser = AtCommandParser::builder()
        .shared_transport(transport.clone())
        .queue(tx)
        .build()
        .unwrap();

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let parser = parser.clone();
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let serial = t * 1000 + i;
                    if i % 2 == 0 {
                        parser
                            .send_response(serial, 0, Some(format!("worker {t}").as_str()))
                            .unwrap();
                    } else {
                        parser
                            .send_async_response(serial, &format!("event {t}"))
                            .unwrap();
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let wire = transport.wire.lock().unwrap().clone();
    let mut offset = 0;
    let mut seen = Vec::new();
    while offset < wire.len() {
        let (response, used) = decode_response(&wire[offset..])
            .unwrap()
            .expect("complete frame");
        let serial = response.serial();
        let t = serial / 1000;
        match response {
            Response::Sync { status, text, .. } => {
                assert_eq!(status, 0);
                assert_eq!(text.as_deref(), Some(format!("worker {t}").as_str()));
            }
            Response::Async { text, .. } => assert_eq!(text, format!("event {t}")),
        }
        seen.push(serial);
        offset += used;
    }

    seen.sort_unstable();
    let expected: Vec<u32> = (0..THREADS)
        .flat_map(|t| (0..PER_THREAD).map(move |i| t * 1000 + i))
        .collect();
    assert_eq!(seen, expected);
}

#[test]
fn input_thread_end_to_end() {
    let transport = Arc::new(MemoryTransport::new());
    let (tx, rx) = message_queue(4);
    let parser = AtCommandParser::builder()
        .shared_transport(transport.clone())
        .queue(tx)
        .build()
        .unwrap();
    parser.register_commands(commands()).unwrap();

    let input = parser.start().unwrap();
    transport.push_input(b"AT+00");
    transport.push_input(b"1312;ECHO,");
    transport.push_input(b"ping me;AT+000013;NOPE\r");

    let msg = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!((msg.command_id, msg.serial), (ECHO, 12));
    parser
        .send_response(msg.serial, 0, msg.payload.as_text())
        .unwrap();

    input.join().unwrap();
    let out = transport.output();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("+S0013,13;1,Invalid cmd;\r\n"));
    assert!(text.contains("+S0009,12;0,ping me;\r\n"));
}
