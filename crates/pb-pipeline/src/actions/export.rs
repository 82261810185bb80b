//! The export action: settles final names and writes output files.
//!
//! This action is registered in both the full and the name-only group. The
//! name-settling part (sanitize, uniquify among siblings, reserve an output
//! path) always runs, so preview and real runs compute identical names; the
//! filesystem and host-export parts only run outside previews.

use std::path::PathBuf;

use pb_core::{Error, OverwriteMode, Result};
use pb_tree::uniquify;

use crate::actions::BuiltinAction;
use crate::batcher::RunState;
use crate::export::{sanitize_filename, with_file_extension};
use crate::overwrite::handle_overwrite;
use crate::placeholders::ResolvedArgs;

/// Exports the current item to the output directory.
pub struct Export;

impl Export {
    pub fn new() -> Self {
        Self
    }
}

impl BuiltinAction for Export {
    fn name(&self) -> &'static str {
        "export"
    }

    fn step(&mut self, state: &mut RunState<'_>, args: &ResolvedArgs) -> Result<()> {
        let item = state.require_current_item()?;

        let output_directory = args
            .path("output_directory")
            .map(PathBuf::from)
            .unwrap_or_else(|| state.opts().output_directory.clone());
        let file_extension = args
            .str_or("file_extension", &state.opts().file_extension)
            .to_string();
        let use_folder_structure =
            args.bool_or("use_folder_structure", state.opts().use_folder_structure);

        // Settle the item name first: sanitize, then resolve sibling
        // collisions. Both mutate the tree so the preview shows exactly
        // what a real run would produce.
        if state.opts().process_names {
            let sanitized = sanitize_filename(&state.tree().item(item).name);
            state.tree_mut().item_mut(item).name = sanitized;

            let position = uniquify::extension_position(&state.tree().item(item).name);
            state
                .uniquifier
                .uniquify(state.tree, item, Some(position));
        }

        let file_name =
            with_file_extension(&state.tree().item(item).name, &file_extension);

        let directory = if use_folder_structure {
            let mut directory = output_directory.clone();
            for component in state.tree().parent_names(item) {
                directory.push(sanitize_filename(&component));
            }
            directory
        } else {
            output_directory
        };

        let path = state.output_paths.resolve(&directory, &file_name);

        if state.opts().is_preview || !state.opts().process_export {
            state.record_predicted(item, path);
            return Ok(());
        }

        let image = match state.current_image() {
            Some(image) => image,
            // Nothing loaded (contents processing disabled); name settling
            // above is still useful, actual output is not possible.
            None => return Ok(()),
        };

        std::fs::create_dir_all(&directory)
            .map_err(|_| Error::InvalidOutputDirectory {
                path: directory.clone(),
            })?;

        let marker_position = path
            .file_name()
            .map(|name| uniquify::extension_position(&name.to_string_lossy()));
        let (mode, path) = handle_overwrite(&path, state.chooser, marker_position)?;

        match mode {
            OverwriteMode::Cancel => return Err(Error::Cancelled),
            OverwriteMode::Skip => {
                return Err(Error::skip(format!(
                    "output file already exists: {}",
                    path.display()
                )));
            }
            _ => {}
        }

        state
            .host_mut()
            .export_image(image, &path)
            .map_err(|err| Error::Export {
                message: err.to_string(),
                item_name: Some(state.tree().item(item).name.clone()),
                file_extension: Some(file_extension.clone()),
            })?;

        tracing::debug!(path = %path.display(), "exported");
        state.record_export(path);
        Ok(())
    }
}
