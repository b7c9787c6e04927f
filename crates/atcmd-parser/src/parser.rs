use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use atcmd_frame::ResponseEncoder;
use atcmd_transport::Transport;
use crossbeam_channel::Sender;
use tracing::{debug, info};

use crate::config::ParserConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ParserError, Result};
use crate::input::InputLoop;
use crate::message::Message;
use crate::registry::{CommandTable, Registry};

const INPUT_THREAD_NAME: &str = "at-cmd-input";

struct Shared {
    transport: Arc<dyn Transport>,
    encoder: Arc<ResponseEncoder>,
    registry: Arc<RwLock<Registry>>,
    queue: Sender<Message>,
    config: ParserConfig,
    input_claimed: AtomicBool,
}

/// Handle to an AT command parser.
///
/// Cloning is cheap and every clone talks to the same transport, registry
/// and response encoder, so responses may be sent from any thread.
#[derive(Clone)]
pub struct AtCommandParser {
    shared: Arc<Shared>,
}

impl AtCommandParser {
    pub fn builder() -> ParserBuilder {
        ParserBuilder::default()
    }

    /// Append a command table. Tables registered earlier take precedence
    /// when names collide.
    pub fn register_commands(&self, table: CommandTable) -> Result<()> {
        let count = table.len();
        self.shared
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(table)?;
        debug!(commands = count, "command table registered");
        Ok(())
    }

    /// Send a synchronous response for the request with `serial`.
    pub fn send_response(&self, serial: u32, status: u32, text: Option<&str>) -> Result<()> {
        self.shared.encoder.send_sync(serial, status, text)?;
        Ok(())
    }

    /// Send an asynchronous notification tagged with `serial`.
    pub fn send_async_response(&self, serial: u32, text: &str) -> Result<()> {
        self.shared.encoder.send_async(serial, text)?;
        Ok(())
    }

    /// Take the parser's input loop to drive it on a thread of your choosing.
    ///
    /// There is one input loop per parser; a second call fails.
    pub fn input_loop(&self) -> Result<InputLoop> {
        if self.shared.input_claimed.swap(true, Ordering::AcqRel) {
            return Err(ParserError::BadParam("input loop already started"));
        }
        Ok(InputLoop::new(
            Dispatcher::new(Arc::clone(&self.shared.registry)),
            Arc::clone(&self.shared.encoder),
            Arc::clone(&self.shared.transport),
            self.shared.queue.clone(),
            self.shared.config.clone(),
        ))
    }

    /// Spawn the input thread.
    ///
    /// The returned handle stops and joins the thread when dropped.
    pub fn start(&self) -> Result<InputThread> {
        let mut input = self.input_loop()?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(INPUT_THREAD_NAME.to_string())
            .spawn(move || input.run(&thread_stop))
            .map_err(|err| {
                self.shared.input_claimed.store(false, Ordering::Release);
                ParserError::Spawn(err)
            })?;

        info!(thread = INPUT_THREAD_NAME, "input thread started");
        Ok(InputThread {
            stop,
            handle: Some(handle),
        })
    }

    pub fn config(&self) -> &ParserConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &Arc<RwLock<Registry>> {
        &self.shared.registry
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.shared.transport
    }
}

impl std::fmt::Debug for AtCommandParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtCommandParser")
            .field("config", &self.shared.config)
            .field(
                "input_claimed",
                &self.shared.input_claimed.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

/// Running input thread.
#[derive(Debug)]
pub struct InputThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl InputThread {
    /// Ask the thread to exit after its current iteration.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the thread and wait for it, returning how the loop ended.
    pub fn join(mut self) -> Result<()> {
        self.stop();
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ParserError::InputPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for InputThread {
    fn drop(&mut self) {
        self.stop();
        if let Err(err) = self.join_inner() {
            debug!(error = %err, "input thread ended with error");
        }
    }
}

/// Builder for [`AtCommandParser`].
#[derive(Default)]
pub struct ParserBuilder {
    transport: Option<Arc<dyn Transport>>,
    queue: Option<Sender<Message>>,
    config: ParserConfig,
}

impl ParserBuilder {
    pub fn transport<T: Transport + 'static>(self, transport: T) -> Self {
        self.shared_transport(Arc::new(transport))
    }

    /// Use a transport the caller keeps a handle to.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn queue(mut self, queue: Sender<Message>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.config.echo = echo;
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<AtCommandParser> {
        let transport = self
            .transport
            .ok_or(ParserError::BadParam("transport is required"))?;
        let queue = self
            .queue
            .ok_or(ParserError::BadParam("message queue is required"))?;
        self.config.validate()?;

        let encoder = Arc::new(ResponseEncoder::with_capacity(
            Arc::clone(&transport),
            self.config.buffer_capacity,
        ));
        debug!(
            buffer_capacity = self.config.buffer_capacity,
            echo = self.config.echo,
            "parser created"
        );

        Ok(AtCommandParser {
            shared: Arc::new(Shared {
                transport,
                encoder,
                registry: Arc::new(RwLock::new(Registry::new())),
                queue,
                config: self.config,
                input_claimed: AtomicBool::new(false),
            }),
        })
    }
}

impl std::fmt::Debug for ParserBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserBuilder")
            .field("transport", &self.transport.is_some())
            .field("queue", &self.queue.is_some())
            .field("config", &self.config)
            .finish()
    }
}
