//! Built-in actions: the transformation steps the engine ships with.
//!
//! Each action is a per-run state object. [`init`](BuiltinAction::init) runs
//! once, before the action's first step (e.g. to load a file a single time
//! and register its disposal on the cleanup group); the engine then calls
//! [`step`](BuiltinAction::step) exactly once per surviving item, with that
//! item's placeholder arguments already resolved.

pub mod background_foreground;
mod export;
mod rename;
mod structure;

use pb_core::{Error, Result};

use crate::batcher::RunState;
use crate::command::{Command, CommandOrigin};
use crate::placeholders::ResolvedArgs;

/// An action implementation, instantiated once per run per configured
/// command.
pub trait BuiltinAction {
    /// Implementation identity, matching `Command::orig_name`.
    fn name(&self) -> &'static str;

    /// One-time setup, run before the first [`step`](BuiltinAction::step).
    fn init(&mut self, _state: &mut RunState<'_>) -> Result<()> {
        Ok(())
    }

    /// Apply the action to the current item.
    fn step(&mut self, state: &mut RunState<'_>, args: &ResolvedArgs) -> Result<()>;
}

/// Whether an implementation only affects item names.
///
/// Name-only actions also run during name-only preview passes, so predicted
/// and real output names never diverge.
pub fn is_name_only(orig_name: &str) -> bool {
    matches!(orig_name, "rename" | "export" | "remove_folder_structure")
}

/// Instantiate the implementation a command configuration names.
///
/// Returns `Ok(None)` for disabled commands whose implementation is
/// unknown; unknown *enabled* commands are an error.
pub fn instantiate(command: &Command) -> Result<Option<Box<dyn BuiltinAction>>> {
    if command.origin != CommandOrigin::Builtin {
        return if command.enabled {
            Err(Error::Validation(format!(
                "action \"{}\" requires a host procedure, which is not available here",
                command.name
            )))
        } else {
            Ok(None)
        };
    }

    let instance: Box<dyn BuiltinAction> = match command.orig_name.as_str() {
        "rename" => Box::new(rename::Rename::new()),
        "export" => Box::new(export::Export::new()),
        "remove_folder_structure" => Box::new(structure::RemoveFolderStructure),
        "insert_background" => Box::new(background_foreground::Insert::background(command)),
        "insert_foreground" => Box::new(background_foreground::Insert::foreground(command)),
        "merge_background" => Box::new(background_foreground::Merge::background()),
        "merge_foreground" => Box::new(background_foreground::Merge::foreground()),
        other => {
            return if command.enabled {
                Err(Error::Validation(format!(
                    "unknown builtin action \"{other}\""
                )))
            } else {
                Ok(None)
            }
        }
    };

    Ok(Some(instance))
}
