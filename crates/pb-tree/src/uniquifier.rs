//! Making item names unique among siblings in an [`ItemTree`].

use std::collections::{HashMap, HashSet};

use crate::item::ItemId;
use crate::tree::ItemTree;
use crate::uniquify;

/// Renames items so that no two siblings under the same parent share a name.
///
/// Scope memory is keyed by parent: within one scope the uniquifier
/// remembers both the items it has already processed and the names it has
/// already emitted. Re-invoking [`uniquify`](ItemUniquifier::uniquify) on an
/// item that was already processed is a guaranteed no-op, regardless of name
/// mutations that happened elsewhere in the meantime. [`reset`]
/// (ItemUniquifier::reset) clears all memory so the same name sequence can
/// be reproduced in a later pass.
#[derive(Debug, Default)]
pub struct ItemUniquifier {
    // key: parent item (None for the tree root)
    visited: HashMap<Option<ItemId>, HashSet<ItemId>>,
    emitted_names: HashMap<Option<ItemId>, HashSet<String>>,
}

impl ItemUniquifier {
    /// Create a uniquifier with empty scope memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the name of `item` unique among its processed siblings,
    /// rewriting `item.name` in place.
    ///
    /// If `position` is given, the disambiguating marker is inserted at that
    /// byte index of the name instead of being appended (used to place the
    /// marker before a file extension). Returns the resulting name.
    pub fn uniquify(
        &mut self,
        tree: &mut ItemTree,
        item: ItemId,
        position: Option<usize>,
    ) -> String {
        let parent = tree.item(item).parent();
        let name = tree.item(item).name.clone();

        let visited = self.visited.entry(parent).or_default();
        let emitted = self.emitted_names.entry(parent).or_default();

        if !visited.insert(item) {
            return name;
        }

        let unique_name = if emitted.contains(&name) {
            let renamed = uniquify::uniquify_string(&name, emitted, position);
            tree.item_mut(item).name = renamed.clone();
            renamed
        } else {
            name
        };

        emitted.insert(unique_name.clone());
        unique_name
    }

    /// Clear all scope memory.
    pub fn reset(&mut self) {
        self.visited.clear();
        self.emitted_names.clear();
    }
}
