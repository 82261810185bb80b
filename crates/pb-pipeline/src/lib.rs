//! pb-pipeline: the action pipeline engine.
//!
//! The [`Batcher`] walks an item tree, filters items through configured
//! conditions, and applies an ordered action list to each surviving item,
//! with placeholder arguments resolved against live run state, name-only
//! preview passes, per-command failure/skip bookkeeping, cooperative
//! cancellation, and cleanup that runs exactly once per run.

pub mod actions;
pub mod batcher;
pub mod command;
pub mod conditions;
pub mod export;
pub mod host;
pub mod invoker;
pub mod overwrite;
pub mod placeholders;

#[cfg(test)]
pub(crate) mod test_host;

// Re-export the most commonly used items at the crate root.
pub use batcher::{
    Batcher, BatcherOpts, CommandFailure, CommandSkip, ProgressSender, RunOutcome, RunState,
    RunSummary,
};
pub use command::{ArgValue, Argument, Command, CommandList, CommandOrigin, MoreOptions};
pub use host::ImageHost;
pub use invoker::{Callable, EntryId, Invoker};
pub use overwrite::{handle_overwrite, NoninteractiveOverwriteChooser, OverwriteChooser};
pub use placeholders::{Placeholder, ResolvedArgs, ResolvedValue};
