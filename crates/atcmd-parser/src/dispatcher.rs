use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::DispatchError;
use crate::message::Message;
use crate::registry::Registry;

/// Split a frame body into command name and argument bytes at the first
/// comma. Without a comma the whole body is the name.
pub fn split_command(body: &[u8]) -> (&[u8], &[u8]) {
    match body.iter().position(|&b| b == b',') {
        Some(comma) => (&body[..comma], &body[comma + 1..]),
        None => (body, &body[body.len()..]),
    }
}

/// Routes frame bodies to registered command handlers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<RwLock<Registry>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<RwLock<Registry>>) -> Self {
        Self { registry }
    }

    /// Look up the command named in `body` and run its handler.
    ///
    /// The registry lock is released before the handler runs, so handlers
    /// may register further tables.
    pub fn dispatch(&self, body: &[u8], serial: u32) -> Result<Message, DispatchError> {
        let (name, args) = split_command(body);

        let command = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(name)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownCommand(lossy(name)))?;

        debug!(
            command = command.name(),
            id = command.id(),
            serial,
            args_len = args.len(),
            "dispatching command"
        );

        command
            .invoke(serial, args)
            .ok_or_else(|| DispatchError::Rejected {
                name: command.name().to_owned(),
                id: command.id(),
            })
    }

    pub fn registry(&self) -> &Arc<RwLock<Registry>> {
        &self.registry
    }
}

fn lossy(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}
