//! Output-name handling for export: filename sanitization and per-run
//! collision tracking across output directories.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use pb_tree::uniquify;

/// Characters rejected by at least one common filesystem.
const INVALID_FILENAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Make `name` safe to use as a file name.
///
/// Invalid and control characters are stripped, trailing dots and
/// surrounding whitespace removed. A name with nothing left becomes
/// `"Untitled"`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !INVALID_FILENAME_CHARS.contains(c) && !c.is_control())
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.').trim_end();

    if cleaned.is_empty() {
        "Untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Replace the file extension of `name` with `extension` (without a leading
/// dot). An empty `extension` strips it.
pub fn with_file_extension(name: &str, extension: &str) -> String {
    let root = pb_tree::renamer::name_root(name);
    if extension.is_empty() {
        root.to_string()
    } else {
        format!("{root}.{extension}")
    }
}

/// Remembers output file names emitted during one run so that two items
/// exporting to the same directory never produce the same path, even before
/// the files exist on disk.
#[derive(Debug, Default)]
pub struct OutputPathResolver {
    // key: output directory; value: file names already handed out there
    emitted: HashMap<PathBuf, HashSet<String>>,
}

impl OutputPathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a collision-free path for `file_name` in `directory`.
    ///
    /// On collision with a name already reserved this run, a `" (<n>)"`
    /// marker is inserted before the file extension.
    pub fn resolve(&mut self, directory: &Path, file_name: &str) -> PathBuf {
        let emitted = self.emitted.entry(directory.to_path_buf()).or_default();
        let position = uniquify::extension_position(file_name);
        let unique = uniquify::uniquify_string(file_name, emitted, Some(position));
        emitted.insert(unique.clone());
        directory.join(unique)
    }
}
