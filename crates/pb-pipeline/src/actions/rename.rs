//! The rename action: applies a name pattern to each item.

use std::collections::HashSet;

use pb_core::Result;
use pb_tree::renamer::{ItemRenamer, RenameEnv};
use pb_tree::ItemId;

use crate::actions::BuiltinAction;
use crate::batcher::RunState;
use crate::placeholders::ResolvedArgs;

/// Renames items (and optionally their parent folders) by pattern.
///
/// The compiled renamer lives for the whole run so numbering fields advance
/// across items; each folder is renamed at most once, when the first of its
/// descendants comes up.
pub struct Rename {
    renamer: Option<ItemRenamer>,
    renamed_folders: HashSet<ItemId>,
}

impl Rename {
    pub fn new() -> Self {
        Self {
            renamer: None,
            renamed_folders: HashSet::new(),
        }
    }
}

impl BuiltinAction for Rename {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn step(&mut self, state: &mut RunState<'_>, args: &ResolvedArgs) -> Result<()> {
        let item = state.require_current_item()?;
        let rename_items = args.bool_or("rename_items", true);
        let rename_folders = args.bool_or("rename_folders", false);

        let renamer = self
            .renamer
            .get_or_insert_with(|| ItemRenamer::new(args.str_or("pattern", "")));

        let mut renames: Vec<(ItemId, String)> = Vec::new();
        {
            let env = RenameEnv {
                tree: state.tree(),
                counts: state.matched_counts(),
                file_extension: &state.opts().file_extension,
                output_directory: &state.opts().output_directory,
            };

            if rename_folders {
                for parent in env.tree.parents_of(item) {
                    if self.renamed_folders.insert(parent) {
                        renames.push((parent, renamer.rename(&env, parent)));
                    }
                }
            }
            if rename_items {
                renames.push((item, renamer.rename(&env, item)));
            }
        }

        for (id, name) in renames {
            tracing::debug!(from = %state.tree().item(id).name, to = %name, "renaming");
            state.tree_mut().item_mut(id).name = name;
        }

        Ok(())
    }
}
