/*!
`registry.rs`

Ordered command table: name -> handler.

Rules:
  - names must be non-empty; nothing else is validated
  - registering an existing name replaces its handler (and summary) in place,
    so the listing keeps the slot of the first registration
  - the table is built once at startup and only read afterwards
*/

use crate::error::{CommandError, DispatchError};

/// A registered handler: receives the arguments after the command name.
pub type Handler = Box<dyn Fn(&[String]) -> Result<(), CommandError>>;

pub struct CommandEntry {
    name: String,
    summary: String,
    handler: Handler,
}

impl CommandEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn invoke(&self, args: &[String]) -> Result<(), CommandError> {
        (self.handler)(args)
    }
}

impl std::fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.name)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct CommandTable {
    entries: Vec<CommandEntry>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`.
    pub fn register<F>(
        &mut self,
        name: &str,
        summary: &str,
        handler: F,
    ) -> Result<&mut Self, DispatchError>
    where
        F: Fn(&[String]) -> Result<(), CommandError> + 'static,
    {
        if name.trim().is_empty() {
            return Err(DispatchError::EmptyName);
        }
        let entry = CommandEntry {
            name: name.to_string(),
            summary: summary.to_string(),
            handler: Box::new(handler),
        };
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(slot) => {
                tracing::trace!(name, "replacing registered command");
                *slot = entry;
            }
            None => self.entries.push(entry),
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Entries in registration order.
    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
