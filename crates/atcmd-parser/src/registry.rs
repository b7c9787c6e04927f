use std::fmt;
use std::sync::Arc;

use crate::error::{ParserError, Result};
use crate::message::Message;

/// Command handler: `(command_id, serial, args) -> message`.
///
/// Returning `None` rejects the command; the parser then reports an error
/// to the host.
pub type Handler = Arc<dyn Fn(u32, u32, &[u8]) -> Option<Message> + Send + Sync>;

/// One command table entry.
#[derive(Clone)]
pub struct CommandDef {
    name: String,
    id: u32,
    handler: Handler,
}

impl CommandDef {
    pub fn new<F>(name: impl Into<String>, id: u32, handler: F) -> Self
    where
        F: Fn(u32, u32, &[u8]) -> Option<Message> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            id,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Run the handler for a request with this serial and argument bytes.
    pub fn invoke(&self, serial: u32, args: &[u8]) -> Option<Message> {
        (self.handler)(self.id, serial, args)
    }

    fn matches(&self, name: &[u8]) -> bool {
        self.name.len() == name.len() && self.name.as_bytes() == name
    }
}

impl fmt::Debug for CommandDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDef")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// An ordered set of commands registered together.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    entries: Vec<CommandDef>,
}

impl CommandTable {
    pub fn new(entries: Vec<CommandDef>) -> Self {
        Self { entries }
    }

    /// Append an entry (builder style).
    pub fn with(mut self, entry: CommandDef) -> Self {
        self.entries.push(entry);
        self
    }

    /// First entry in this table whose name matches exactly.
    pub fn find(&self, name: &[u8]) -> Option<&CommandDef> {
        self.entries.iter().find(|entry| entry.matches(name))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CommandDef> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<CommandDef> for CommandTable {
    fn from_iter<I: IntoIterator<Item = CommandDef>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Append-only list of command tables, searched in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    tables: Vec<CommandTable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a table. Nothing changes if the table is rejected.
    pub fn register(&mut self, table: CommandTable) -> Result<()> {
        if table.is_empty() {
            return Err(ParserError::BadParam("command table is empty"));
        }
        self.tables
            .try_reserve(1)
            .map_err(|_| ParserError::NoMemory)?;
        self.tables.push(table);
        Ok(())
    }

    /// Find a command by exact name. Earlier tables win over later ones, and
    /// earlier entries over later entries in the same table.
    pub fn lookup(&self, name: &[u8]) -> Option<&CommandDef> {
        self.tables.iter().find_map(|table| table.find(name))
    }

    /// Total number of registered commands.
    pub fn len(&self) -> usize {
        self.tables.iter().map(CommandTable::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// All commands in search order.
    pub fn commands(&self) -> impl Iterator<Item = &CommandDef> {
        self.tables.iter().flat_map(CommandTable::iter)
    }
}
