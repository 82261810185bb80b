//! The folder-structure flattening action.

use pb_core::Result;

use crate::actions::BuiltinAction;
use crate::batcher::RunState;
use crate::placeholders::ResolvedArgs;

/// Moves each processed item to the top level of the tree.
///
/// Name-only: flattening changes predicted output paths, not pixel
/// content, so it also runs during previews.
pub struct RemoveFolderStructure;

impl BuiltinAction for RemoveFolderStructure {
    fn name(&self) -> &'static str {
        "remove_folder_structure"
    }

    fn step(&mut self, state: &mut RunState<'_>, _args: &ResolvedArgs) -> Result<()> {
        let item = state.require_current_item()?;
        state.tree_mut().reparent_to_top(item);
        Ok(())
    }
}
