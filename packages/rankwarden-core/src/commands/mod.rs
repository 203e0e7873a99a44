//! # Command Registry
//!
//! Chat command metadata and name resolution. Execution lives with the
//! presentation layer; this module only answers "which command did the user
//! mean".

mod resolver;

pub use resolver::resolve;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Help-page grouping of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandGroup {
    /// Invite counts and leaderboards
    Invites,
    /// Rank table administration
    Ranks,
    /// Anything else
    Other,
}

/// A registered command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Canonical name
    pub name: String,
    /// Alternative names, matched exactly
    pub aliases: Vec<String>,
    /// Help grouping
    pub group: CommandGroup,
}

impl Command {
    /// Build a command; names and aliases are stored lowercase.
    pub fn new(name: &str, aliases: &[&str], group: CommandGroup) -> Self {
        Self {
            name: name.to_lowercase(),
            aliases: aliases.iter().map(|a| a.to_lowercase()).collect(),
            group,
        }
    }
}

/// Ordered set of commands.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl CommandRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command. Names must be unique.
    pub fn register(&mut self, command: Command) -> Result<()> {
        if self.commands.iter().any(|c| c.name == command.name) {
            return Err(Error::Misconfiguration(format!(
                "command `{}` registered twice",
                command.name
            )));
        }
        self.commands.push(command);
        Ok(())
    }

    /// All commands in registration order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Resolve a typed name against this registry.
    pub fn resolve(&self, typed: &str) -> Result<&Command> {
        resolve(typed, &self.commands)
    }
}
