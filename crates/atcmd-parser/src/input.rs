use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use atcmd_frame::{FrameScanner, RawFrame, ResponseEncoder, STATUS_ERROR};
use atcmd_transport::{Transport, TransportError};
use bytes::BytesMut;
use crossbeam_channel::{SendTimeoutError, Sender};
use tracing::{debug, trace, warn};

use crate::config::ParserConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ParserError, Result};
use crate::message::Message;

/// Text sent when a message could not be handed to the application.
const QUEUE_ERROR_TEXT: &str = "queue error";

/// Outcome counts for one processed chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkReport {
    /// Frames that completed in this chunk.
    pub frames: usize,
    /// Messages handed to the queue.
    pub queued: usize,
    /// Error responses sent.
    pub errors: usize,
    /// Framing errors caused by a frame outgrowing the command buffer.
    pub overflows: usize,
    /// Messages dropped because the queue was full or gone.
    pub dropped: usize,
}

/// Owns the scanner and drives bytes from the transport through framing,
/// dispatch and the message queue.
///
/// Only one input loop exists per parser; it is the single consumer of
/// transport input.
pub struct InputLoop {
    scanner: FrameScanner,
    staging: BytesMut,
    dispatcher: Dispatcher,
    encoder: Arc<ResponseEncoder>,
    transport: Arc<dyn Transport>,
    queue: Sender<Message>,
    config: ParserConfig,
}

impl InputLoop {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        encoder: Arc<ResponseEncoder>,
        transport: Arc<dyn Transport>,
        queue: Sender<Message>,
        config: ParserConfig,
    ) -> Self {
        Self {
            scanner: FrameScanner::new(config.buffer_capacity),
            staging: BytesMut::with_capacity(config.read_chunk_size),
            dispatcher,
            encoder,
            transport,
            queue,
            config,
        }
    }

    /// Feed one chunk of received bytes through the parser.
    ///
    /// Every completed frame is dispatched and its message queued; every
    /// framing, dispatch or queue failure produces one error response.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> ChunkReport {
        let mut report = ChunkReport::default();
        if chunk.is_empty() {
            return report;
        }

        if self.config.echo {
            if let Err(err) = self.encoder.write_raw(chunk) {
                warn!(error = %err, "echo write failed");
            }
        }

        self.staging.extend_from_slice(chunk);
        loop {
            match self.scanner.decode(&mut self.staging) {
                Ok(Some(frame)) => {
                    report.frames += 1;
                    match self.handle_frame(&frame) {
                        Ok(()) => report.queued += 1,
                        Err(err) => {
                            if matches!(
                                err,
                                ParserError::QueueTimeout(_) | ParserError::QueueDisconnected
                            ) {
                                report.dropped += 1;
                            }
                            report.errors += 1;
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(error = %err, "framing error");
                    self.reply_error(0, err.response_text());
                    if err.is_overflow() {
                        report.overflows += 1;
                    }
                    report.errors += 1;
                }
            }
        }

        trace!(?report, "chunk processed");
        report
    }

    /// Read and process input until `stop` is set or the transport closes.
    ///
    /// Transient read errors are logged and retried after the idle delay.
    /// A closed transport ends the loop with an error.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        let mut chunk = vec![0u8; self.config.read_chunk_size];
        debug!("input loop started");

        while !stop.load(Ordering::Acquire) {
            if !self.transport.is_data_ready() {
                thread::sleep(self.config.idle_delay);
                continue;
            }

            match self.transport.read(&mut chunk) {
                Ok(0) => thread::sleep(self.config.idle_delay),
                Ok(n) => {
                    self.process_chunk(&chunk[..n]);
                }
                Err(TransportError::Closed) => {
                    debug!("transport closed, input loop exiting");
                    return Err(ParserError::Transport(TransportError::Closed));
                }
                Err(err) => {
                    warn!(error = %err, "transport read failed");
                    thread::sleep(self.config.idle_delay);
                }
            }
        }

        debug!("input loop stopped");
        Ok(())
    }

    /// Drop any partially received frame and buffered input.
    pub fn reset(&mut self) {
        self.scanner.reset();
        self.staging.clear();
    }

    pub fn scanner(&self) -> &FrameScanner {
        &self.scanner
    }

    /// Dispatch one frame and hand its message to the queue. Every failure
    /// has already been answered on the wire when this returns `Err`.
    fn handle_frame(&mut self, frame: &RawFrame) -> Result<()> {
        let body = frame.body();
        let message = match self.dispatcher.dispatch(&body, frame.serial) {
            Ok(message) => message,
            Err(err) => {
                debug!(serial = frame.serial, error = %err, "dispatch failed");
                self.reply_error(frame.serial, err.response_text());
                return Err(err.into());
            }
        };

        match self.queue.send_timeout(message, self.config.queue_timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(message)) => {
                warn!(
                    serial = message.serial,
                    command_id = message.command_id,
                    timeout = ?self.config.queue_timeout,
                    "message queue full, dropping message"
                );
                self.reply_error(frame.serial, QUEUE_ERROR_TEXT);
                Err(ParserError::QueueTimeout(self.config.queue_timeout))
            }
            Err(SendTimeoutError::Disconnected(message)) => {
                warn!(
                    serial = message.serial,
                    command_id = message.command_id,
                    "message queue disconnected, dropping message"
                );
                self.reply_error(frame.serial, QUEUE_ERROR_TEXT);
                Err(ParserError::QueueDisconnected)
            }
        }
    }

    fn reply_error(&self, serial: u32, text: &str) {
        if let Err(err) = self.encoder.send_sync(serial, STATUS_ERROR, Some(text)) {
            warn!(serial, error = %err, "failed to send error response");
        }
    }
}

impl std::fmt::Debug for InputLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputLoop")
            .field("scanner", &self.scanner)
            .field("staged", &self.staging.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
