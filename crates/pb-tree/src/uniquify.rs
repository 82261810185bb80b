//! Functions to modify strings or file paths to make them unique.

use std::path::{Path, PathBuf};

/// Make `value` unique according to `is_unique`.
///
/// If `value` already satisfies `is_unique`, it is returned unchanged.
/// Otherwise a marker of the form `" (<n>)"` is inserted at `position`
/// (byte index; `None` appends at the end), with `<n>` starting at 1 and
/// incremented until `is_unique` accepts the result. A value that already
/// ends in such a marker still receives a new, separate marker; existing
/// markers are never reused.
pub fn uniquify_with(
    value: &str,
    is_unique: impl Fn(&str) -> bool,
    position: Option<usize>,
) -> String {
    if is_unique(value) {
        return value.to_string();
    }

    let position = position.unwrap_or(value.len()).min(value.len());
    let (head, tail) = value.split_at(position);

    let mut n = 1u64;
    loop {
        let candidate = format!("{head} ({n}){tail}");
        if is_unique(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Make `value` unique among `existing` strings.
pub fn uniquify_string(
    value: &str,
    existing: &std::collections::HashSet<String>,
    position: Option<usize>,
) -> String {
    uniquify_with(value, |candidate| !existing.contains(candidate), position)
}

/// Make a file path unique if a file with the same path already exists.
///
/// `position` indexes into the final path component (typically just before
/// the file extension, so `"name.png"` becomes `"name (1).png"` rather than
/// `"name.png (1)"`).
pub fn uniquify_path(path: &Path, position: Option<usize>) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let unique = uniquify_with(
        &file_name,
        |candidate| !parent.join(candidate).exists(),
        position,
    );

    parent.join(unique)
}

/// Byte index of the start of the file extension in `name`, or the name
/// length when there is none.
///
/// Points at the final `'.'`, so inserting a marker there produces
/// `"name (1).png"`.
pub fn extension_position(name: &str) -> usize {
    name.rfind('.').unwrap_or(name.len())
}
