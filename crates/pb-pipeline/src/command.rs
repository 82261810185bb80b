//! Command configuration: the serializable description of one action or
//! condition instance.
//!
//! A [`Command`] is plain data supplied by the caller (GUI, config file, or
//! code): which implementation to run (`orig_name`), under what display/key
//! names, whether it is enabled, and with what argument values. Several
//! instances of the same implementation may coexist in one list; the list
//! disambiguates their keys and display names on insertion.

use std::path::PathBuf;

use pb_core::ColorTag;
use serde::{Deserialize, Serialize};

use crate::placeholders::Placeholder;

/// Where a command's implementation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOrigin {
    /// Implemented directly in this crate.
    #[default]
    Builtin,
    /// Backed by a procedure the host application registers.
    HostProcedure,
}

/// One argument value: a literal, or a placeholder resolved at invocation
/// time against live batcher state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Path(PathBuf),
    ColorTag(ColorTag),
    Placeholder(Placeholder),
}

/// A named argument of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub value: ArgValue,
}

impl Argument {
    /// Shorthand constructor.
    pub fn new(name: impl Into<String>, value: ArgValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Per-command flags beyond the argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MoreOptions {
    /// Whether the command also applies during name-only preview passes.
    pub enabled_for_previews: bool,
    /// For conditions: also require the condition to hold for every parent
    /// folder of the item.
    pub also_apply_to_parent_folders: bool,
}

/// Configuration of one action or condition instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Unique key within its list. Derived from `orig_name`, suffixed on
    /// collision.
    pub name: String,
    /// Identity of the underlying implementation; stable across renames of
    /// this instance.
    pub orig_name: String,
    /// Human-readable name, also suffixed on collision.
    pub display_name: String,
    pub enabled: bool,
    #[serde(default)]
    pub origin: CommandOrigin,
    #[serde(default)]
    pub arguments: Vec<Argument>,
    #[serde(default)]
    pub more_options: MoreOptions,
}

impl Command {
    /// A new enabled builtin command; `name` and `display_name` start out
    /// equal to `orig_name`.
    pub fn builtin(orig_name: impl Into<String>) -> Self {
        let orig_name = orig_name.into();
        Self {
            name: orig_name.clone(),
            display_name: orig_name.clone(),
            orig_name,
            enabled: true,
            origin: CommandOrigin::Builtin,
            arguments: Vec::new(),
            more_options: MoreOptions::default(),
        }
    }

    /// Builder: replace the argument list.
    pub fn with_arguments(mut self, arguments: Vec<Argument>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Builder: set enabled state.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder: enable for name-only preview passes.
    pub fn enabled_for_previews(mut self) -> Self {
        self.more_options.enabled_for_previews = true;
        self
    }

    /// Builder: also apply to parent folders (conditions).
    pub fn also_apply_to_parent_folders(mut self) -> Self {
        self.more_options.also_apply_to_parent_folders = true;
        self
    }

    /// The value of the named argument, if present.
    pub fn argument(&self, name: &str) -> Option<&ArgValue> {
        self.arguments
            .iter()
            .find(|argument| argument.name == name)
            .map(|argument| &argument.value)
    }
}

/// An ordered list of commands with key/display-name disambiguation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandList {
    commands: Vec<Command>,
}

impl CommandList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command, making its `name` and `display_name` unique within
    /// the list.
    ///
    /// A second instance of `scale` becomes `scale_2` with display name
    /// `"scale (2)"`, a third `scale_3`, and so on.
    pub fn add(&mut self, mut command: Command) -> &Command {
        let mut n = 2;
        let base = command.name.clone();
        while self.get(&command.name).is_some() {
            command.name = format!("{base}_{n}");
            n += 1;
        }

        let mut n = 2;
        let display_base = command.display_name.clone();
        while self
            .commands
            .iter()
            .any(|existing| existing.display_name == command.display_name)
        {
            command.display_name = format!("{display_base} ({n})");
            n += 1;
        }

        self.commands.push(command);
        self.commands.last().expect("just pushed")
    }

    /// Look up a command by its unique key.
    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|command| command.name == name)
    }

    /// The commands, in configured order.
    pub fn as_slice(&self) -> &[Command] {
        &self.commands
    }

    /// Number of commands in the list.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<'a> IntoIterator for &'a CommandList {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

impl From<Vec<Command>> for CommandList {
    fn from(commands: Vec<Command>) -> Self {
        let mut list = CommandList::new();
        for command in commands {
            list.add(command);
        }
        list
    }
}
