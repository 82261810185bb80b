//! Building item trees from input directories and driving batch runs.

use std::path::Path;

use pb_core::{Error, Result};
use pb_pipeline::batcher::RunSummary;
use pb_pipeline::{Batcher, NoninteractiveOverwriteChooser, ProgressSender};
use pb_tree::{ItemTree, RawRef};
use walkdir::WalkDir;

use crate::config::Config;
use crate::file_host::FileHost;

/// File extensions accepted as input images.
const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff", "webp", "tga", "ico",
];

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Build an item tree from the image files under `input`.
///
/// Subdirectories become folder items (unless `flat` is set, which stays at
/// depth 1); files and folders are added in sorted order so runs are
/// reproducible across platforms.
pub fn collect_tree(input: &Path, flat: bool) -> Result<ItemTree> {
    if !input.is_dir() {
        return Err(Error::Validation(format!(
            "input is not a directory: {}",
            input.display()
        )));
    }

    let mut walker = WalkDir::new(input).sort_by_file_name();
    if flat {
        walker = walker.max_depth(1);
    }

    let mut tree = ItemTree::new();
    for entry in walker {
        let entry = entry.map_err(|err| {
            Error::Validation(format!("cannot walk {}: {err}", input.display()))
        })?;
        if !entry.file_type().is_file() || !is_image_file(entry.path()) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(input)
            .map_err(|_| Error::Internal("walked path outside the input root".into()))?;
        let components: Vec<String> = relative
            .iter()
            .map(|part| part.to_string_lossy().into_owned())
            .collect();
        let component_refs: Vec<&str> = components.iter().map(String::as_str).collect();

        tree.add_leaf_at_path(&component_refs, RawRef::File(entry.path().to_path_buf()))?;
    }

    if tree.is_empty() {
        tracing::warn!(input = %input.display(), "no image files found");
    }

    Ok(tree)
}

/// Run the configured pipeline over `input`, returning the run's status
/// surface. `preview` computes predicted names without processing.
pub fn run_batch(config: &Config, input: &Path, preview: bool) -> Result<RunSummary> {
    config.validate()?;

    let mut tree = collect_tree(input, false)?;
    run_batch_on_tree(config, &mut tree, preview)
}

/// Like [`run_batch`], over an already-built tree.
pub fn run_batch_on_tree(
    config: &Config,
    tree: &mut ItemTree,
    preview: bool,
) -> Result<RunSummary> {
    let mut host = FileHost::new();
    let mut chooser = NoninteractiveOverwriteChooser::new(config.batch.overwrite_mode);
    let opts = config.batcher_opts(preview);

    let batcher = Batcher::new(
        tree,
        &mut host,
        &mut chooser,
        &config.actions,
        &config.conditions,
        opts,
    )?
    .with_progress(ProgressSender::new(|done, total, item| {
        tracing::info!("[{done}/{total}] {item}");
    }));

    Ok(batcher.run())
}
