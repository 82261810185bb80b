//! Unified error type for the pixelbatch engine.
//!
//! All crates funnel their failures into [`Error`]. The variants mirror the
//! engine's propagation policy: [`Error::Cancelled`] always unwinds to the
//! top of a run, [`Error::Skip`] is recorded and swallowed at the action
//! boundary, and everything else is either recorded per action or treated
//! as fatal depending on where it surfaces.

use std::path::PathBuf;

/// Unified error type covering all failure modes in pixelbatch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The run was canceled by the user or the host application.
    ///
    /// Never recorded as a failure; cleanup still runs.
    #[error("batch processing canceled")]
    Cancelled,

    /// An action or condition voluntarily skipped itself for the current
    /// item (e.g. "there are no background layers").
    #[error("skipped: {0}")]
    Skip(String),

    /// A named action failed for a specific item.
    #[error("action \"{command}\" failed for \"{item}\": {message}")]
    Action {
        /// Name of the failing command.
        command: String,
        /// Name of the item being processed when the failure occurred.
        item: String,
        /// Human-readable error description.
        message: String,
    },

    /// Writing an output file failed.
    #[error("export failed: {message}")]
    Export {
        /// Human-readable error description.
        message: String,
        /// Name of the item being exported, if known.
        item_name: Option<String>,
        /// File extension the export was attempted with, if known.
        file_extension: Option<String>,
    },

    /// The configured output directory does not exist or cannot be used.
    #[error("invalid output directory: {}", path.display())]
    InvalidOutputDirectory {
        /// The offending directory path.
        path: PathBuf,
    },

    /// An input file could not be loaded.
    #[error("{message}: {}", path.display())]
    FileLoad {
        /// Human-readable error description.
        message: String,
        /// Path of the file that failed to load.
        path: PathBuf,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Configuration or input data failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::Skip`].
    pub fn skip(message: impl Into<String>) -> Self {
        Error::Skip(message.into())
    }

    /// Convenience constructor for [`Error::Action`].
    pub fn action(
        command: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Action {
            command: command.into(),
            item: item.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Export`].
    pub fn export(message: impl Into<String>) -> Self {
        Error::Export {
            message: message.into(),
            item_name: None,
            file_extension: None,
        }
    }

    /// Convenience constructor for [`Error::FileLoad`].
    pub fn file_load(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Error::FileLoad {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Whether this error represents a cooperative cancellation rather than
    /// a genuine failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Whether this error represents a voluntary per-item skip.
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::Skip(_))
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
