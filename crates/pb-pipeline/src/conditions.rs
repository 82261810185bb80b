//! Built-in conditions: predicates deciding which items get processed.
//!
//! Conditions are evaluated in configured order before the per-item walk
//! starts; an item survives only if every enabled condition accepts it. A
//! condition may keep state across items (`&mut self`), and may raise
//! [`Error::Skip`] to abstain for one item.

use pb_core::{ColorTag, Error, Result};
use pb_tree::{renamer, ItemId, RawRef};

use crate::batcher::RunState;
use crate::command::{Command, CommandOrigin};
use crate::placeholders::ResolvedArgs;

/// A condition implementation, instantiated once per run.
pub trait BuiltinCondition {
    /// Implementation identity, matching `Command::orig_name`.
    fn name(&self) -> &'static str;

    /// Whether `item` passes this condition.
    fn matches(
        &mut self,
        state: &RunState<'_>,
        item: ItemId,
        args: &ResolvedArgs,
    ) -> Result<bool>;
}

/// Instantiate the implementation a command configuration names.
///
/// Returns `Ok(None)` for disabled commands whose implementation is
/// unknown, so stale configurations do not block unrelated processing;
/// unknown *enabled* commands are an error.
pub fn instantiate(command: &Command) -> Result<Option<Box<dyn BuiltinCondition>>> {
    if command.origin != CommandOrigin::Builtin {
        return if command.enabled {
            Err(Error::Validation(format!(
                "condition \"{}\" requires a host procedure, which is not available here",
                command.name
            )))
        } else {
            Ok(None)
        };
    }

    let instance: Box<dyn BuiltinCondition> = match command.orig_name.as_str() {
        "always" => Box::new(Always),
        "matching_file_extension" => Box::new(MatchingFileExtension),
        "top_level" => Box::new(TopLevel),
        "visible" => Box::new(Visible),
        "with_color_tag" => Box::new(WithColorTag { negate: false }),
        "without_color_tag" => Box::new(WithColorTag { negate: true }),
        other => {
            return if command.enabled {
                Err(Error::Validation(format!(
                    "unknown builtin condition \"{other}\""
                )))
            } else {
                Ok(None)
            }
        }
    };

    Ok(Some(instance))
}

struct Always;

impl BuiltinCondition for Always {
    fn name(&self) -> &'static str {
        "always"
    }

    fn matches(&mut self, _: &RunState<'_>, _: ItemId, _: &ResolvedArgs) -> Result<bool> {
        Ok(true)
    }
}

/// Matches items whose name carries the configured output file extension.
struct MatchingFileExtension;

impl BuiltinCondition for MatchingFileExtension {
    fn name(&self) -> &'static str {
        "matching_file_extension"
    }

    fn matches(
        &mut self,
        state: &RunState<'_>,
        item: ItemId,
        _: &ResolvedArgs,
    ) -> Result<bool> {
        let name = &state.tree().item(item).name;
        Ok(renamer::file_extension(name).eq_ignore_ascii_case(&state.opts().file_extension))
    }
}

struct TopLevel;

impl BuiltinCondition for TopLevel {
    fn name(&self) -> &'static str {
        "top_level"
    }

    fn matches(&mut self, state: &RunState<'_>, item: ItemId, _: &ResolvedArgs) -> Result<bool> {
        Ok(state.tree().item(item).parent().is_none())
    }
}

/// Matches visible layers; items that are not layers always pass.
struct Visible;

impl BuiltinCondition for Visible {
    fn name(&self) -> &'static str {
        "visible"
    }

    fn matches(&mut self, state: &RunState<'_>, item: ItemId, _: &ResolvedArgs) -> Result<bool> {
        match state.tree().item(item).raw {
            RawRef::Layer(layer) => state.host().layer_visible(layer),
            _ => Ok(true),
        }
    }
}

/// Matches layers by color tag. With the tag argument left at
/// [`ColorTag::None`], any tagged layer matches; `negate` flips the result
/// (the "without color tag" condition).
struct WithColorTag {
    negate: bool,
}

impl BuiltinCondition for WithColorTag {
    fn name(&self) -> &'static str {
        if self.negate {
            "without_color_tag"
        } else {
            "with_color_tag"
        }
    }

    fn matches(
        &mut self,
        state: &RunState<'_>,
        item: ItemId,
        args: &ResolvedArgs,
    ) -> Result<bool> {
        let wanted = args.color_tag("color_tag");
        let actual = match state.tree().item(item).raw {
            RawRef::Layer(layer) => state.host().layer_color_tag(layer)?,
            _ => ColorTag::None,
        };

        let tagged = if wanted.is_none() {
            !actual.is_none()
        } else {
            actual == wanted
        };

        Ok(tagged != self.negate)
    }
}
