//! Named-command registration boundary for an external console.
//!
//! The console interpreter itself (prompt, line editing, transport) is an
//! external collaborator; this module only holds the contract it consumes:
//! named commands with a handler, short usage text, and long help text.
//! Handlers run on whatever thread the console runs on, communicate with the
//! sweep thread through [`signal`] primitives, and write their response into
//! a bounded [`DiagBuf`].
//!
//! [`signal`]: crate::signal

use std::fmt::{self, Write as _};
use std::sync::Mutex;

use crate::diag::DiagBuf;

/// Handler signature: argument string (already stripped of the command name)
/// plus the bounded response buffer.
pub type CommandHandler = Box<dyn Fn(&str, &mut DiagBuf) + Send + Sync>;

/// One registered console command.
pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    handler: CommandHandler,
}

impl Command {
    pub fn new(
        name: &'static str,
        usage: &'static str,
        help: &'static str,
        handler: impl Fn(&str, &mut DiagBuf) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            usage,
            help,
            handler: Box::new(handler),
        }
    }
}

/// Command registry errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// A command with this name is already registered.
    Duplicate(&'static str),
    /// No command with this name is registered.
    Unknown(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Duplicate(name) => write!(f, "command `{name}` already registered"),
            CommandError::Unknown(name) => write!(f, "unknown command `{name}`"),
        }
    }
}

impl std::error::Error for CommandError {}

/// Thread-safe command table, registration order preserved for help output.
///
/// Handlers must not call back into the registry; dispatch holds the table
/// lock while the handler runs.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Mutex<Vec<Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command under its unique name.
    pub fn register(&self, command: Command) -> Result<(), CommandError> {
        let mut commands = self.commands.lock().expect("command table mutex poisoned");
        if commands.iter().any(|c| c.name == command.name) {
            return Err(CommandError::Duplicate(command.name));
        }
        commands.push(command);
        Ok(())
    }

    /// Parses `line` as `<name> [args...]` and invokes the matching handler.
    pub fn dispatch(&self, line: &str, out: &mut DiagBuf) -> Result<(), CommandError> {
        let line = line.trim();
        let (name, args) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim_start()),
            None => (line, ""),
        };

        let commands = self.commands.lock().expect("command table mutex poisoned");
        let command = commands
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CommandError::Unknown(name.to_string()))?;
        (command.handler)(args, out);
        Ok(())
    }

    /// Renders one help line per command in registration order.
    pub fn render_help(&self, out: &mut DiagBuf) {
        let commands = self.commands.lock().expect("command table mutex poisoned");
        for command in commands.iter() {
            if command.usage.is_empty() {
                let _ = writeln!(out, "{}\t{}", command.name, command.help);
            } else {
                let _ = writeln!(out, "{} {}\t{}", command.name, command.usage, command.help);
            }
        }
    }
}
