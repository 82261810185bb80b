//! Resolution of destination-path conflicts during export.

use std::path::{Path, PathBuf};

use pb_core::{OverwriteMode, Result};
use pb_tree::uniquify;

/// Decides how to handle a destination path that already exists.
///
/// Interactive implementations prompt the user; once the user picks "apply
/// to all remaining", the choice must be remembered for the rest of the run.
/// Non-interactive implementations return a fixed configured mode.
pub trait OverwriteChooser {
    /// Choose how to handle the conflicting `path`.
    fn choose(&mut self, path: &Path) -> OverwriteMode;
}

/// Chooser that always returns the mode it was configured with.
#[derive(Debug, Clone)]
pub struct NoninteractiveOverwriteChooser {
    mode: OverwriteMode,
}

impl NoninteractiveOverwriteChooser {
    pub fn new(mode: OverwriteMode) -> Self {
        Self { mode }
    }
}

impl OverwriteChooser for NoninteractiveOverwriteChooser {
    fn choose(&mut self, _path: &Path) -> OverwriteMode {
        self.mode
    }
}

/// Resolve how to handle writing to `path`.
///
/// If `path` does not exist there is nothing to decide and
/// [`OverwriteMode::DoNothing`] is returned with the path unchanged.
/// Otherwise the chooser is consulted; for [`OverwriteMode::RenameNew`] the
/// returned path is a uniquified variant of `path`, and for
/// [`OverwriteMode::RenameExisting`] the existing file is renamed on disk
/// and `path` is returned unchanged. `position` indexes into the file name
/// where the uniquifying marker goes (before the extension, typically).
pub fn handle_overwrite(
    path: &Path,
    chooser: &mut dyn OverwriteChooser,
    position: Option<usize>,
) -> Result<(OverwriteMode, PathBuf)> {
    if !path.exists() {
        return Ok((OverwriteMode::DoNothing, path.to_path_buf()));
    }

    let mode = chooser.choose(path);
    let resolved = match mode {
        OverwriteMode::RenameNew => uniquify::uniquify_path(path, position),
        OverwriteMode::RenameExisting => {
            let renamed_existing = uniquify::uniquify_path(path, position);
            std::fs::rename(path, &renamed_existing)?;
            path.to_path_buf()
        }
        _ => path.to_path_buf(),
    };

    Ok((mode, resolved))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Chooser that records every prompt and replays scripted answers,
    /// remembering the last one once the script runs out ("apply to all").
    struct ScriptedChooser {
        answers: Vec<OverwriteMode>,
        prompts: Vec<PathBuf>,
    }

    impl OverwriteChooser for ScriptedChooser {
        fn choose(&mut self, path: &Path) -> OverwriteMode {
            self.prompts.push(path.to_path_buf());
            if self.answers.len() > 1 {
                self.answers.remove(0)
            } else {
                self.answers[0]
            }
        }
    }

    fn extension_marker_position(path: &Path) -> Option<usize> {
        let name = path.file_name()?.to_string_lossy();
        Some(uniquify::extension_position(&name))
    }

    #[test]
    fn fresh_path_needs_no_choice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::Skip);

        let (mode, resolved) = handle_overwrite(&path, &mut chooser, None).unwrap();
        assert_eq!(mode, OverwriteMode::DoNothing);
        assert_eq!(resolved, path);
    }

    #[test]
    fn rename_new_uniquifies_the_new_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        std::fs::write(&path, b"existing").unwrap();

        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameNew);
        let (mode, resolved) =
            handle_overwrite(&path, &mut chooser, extension_marker_position(&path)).unwrap();

        assert_eq!(mode, OverwriteMode::RenameNew);
        assert_eq!(resolved, dir.path().join("out (1).png"));
        // The existing file is untouched.
        assert!(path.exists());
    }

    #[test]
    fn rename_existing_moves_the_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        std::fs::write(&path, b"existing").unwrap();

        let mut chooser = NoninteractiveOverwriteChooser::new(OverwriteMode::RenameExisting);
        let (mode, resolved) =
            handle_overwrite(&path, &mut chooser, extension_marker_position(&path)).unwrap();

        assert_eq!(mode, OverwriteMode::RenameExisting);
        assert_eq!(resolved, path);
        assert!(!path.exists());
        assert!(dir.path().join("out (1).png").exists());
    }

    #[test]
    fn replace_and_skip_leave_the_path_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        std::fs::write(&path, b"existing").unwrap();

        for mode in [OverwriteMode::Replace, OverwriteMode::Skip, OverwriteMode::Cancel] {
            let mut chooser = NoninteractiveOverwriteChooser::new(mode);
            let (chosen, resolved) = handle_overwrite(&path, &mut chooser, None).unwrap();
            assert_eq!(chosen, mode);
            assert_eq!(resolved, path);
        }
    }

    #[test]
    fn scripted_chooser_remembers_last_answer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        std::fs::write(&path, b"existing").unwrap();

        let mut chooser = ScriptedChooser {
            answers: vec![OverwriteMode::Skip, OverwriteMode::Replace],
            prompts: Vec::new(),
        };

        let (first, _) = handle_overwrite(&path, &mut chooser, None).unwrap();
        let (second, _) = handle_overwrite(&path, &mut chooser, None).unwrap();
        let (third, _) = handle_overwrite(&path, &mut chooser, None).unwrap();

        assert_eq!(first, OverwriteMode::Skip);
        assert_eq!(second, OverwriteMode::Replace);
        // "Apply to all remaining": the last scripted answer sticks.
        assert_eq!(third, OverwriteMode::Replace);
        assert_eq!(chooser.prompts.len(), 3);
    }
}
