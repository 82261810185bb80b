//! Configuration enums shared between the engine and its drivers.
//!
//! The full run configuration (command lists, export settings) lives with
//! the driver; the engine itself only depends on the small policy enums
//! defined here.

use serde::{Deserialize, Serialize};

/// How to handle a destination path that already exists.
///
/// Interactive drivers present these as choices to the user; non-interactive
/// drivers configure a fixed mode up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwriteMode {
    /// Overwrite the existing file with new contents.
    Replace,
    /// Leave the existing file alone and do not write the new one.
    Skip,
    /// Rename the file about to be written so both can coexist.
    RenameNew,
    /// Rename the existing file on disk, then write under the original name.
    RenameExisting,
    /// Abort the remaining run. Used when the user closes an interactive
    /// chooser.
    Cancel,
    /// No conflict existed, so no choice was needed.
    DoNothing,
}

impl Default for OverwriteMode {
    fn default() -> Self {
        OverwriteMode::RenameNew
    }
}

/// What the engine does after an action fails for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure, skip the item's remaining actions, and continue
    /// with the next item.
    #[default]
    ContinueWithNextItem,
    /// Record the failure and terminate the whole run.
    Abort,
}
