//! Ordered forest of items with keyed lookup and depth-first iteration.

use std::collections::HashMap;

use pb_core::{Error, Result};

use crate::item::{Item, ItemId, ItemType, RawRef};

/// An ordered forest of [`Item`]s.
///
/// The tree is built once per batch run from the input context (a set of
/// file paths or one image's layer stack), mutated in place while actions
/// rename and restructure items, and discarded at the end of the run.
///
/// Items are stored in an arena indexed by [`ItemId`]; removal never
/// invalidates other ids. Lookup by path is keyed on `orig_name` components
/// (disambiguated by item type, so a folder and a leaf may share a name) and
/// is unaffected by renames performed mid-run. Sibling `name` collisions are
/// permitted until a [`ItemUniquifier`](crate::ItemUniquifier) pass resolves
/// them; when two items are added under the same key, the first keeps the
/// keyed lookup entry.
#[derive(Debug, Default)]
pub struct ItemTree {
    items: Vec<Option<Item>>,
    top_level: Vec<ItemId>,
    by_key: HashMap<(Vec<String>, ItemType), ItemId>,
}

impl ItemTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a folder under `parent` (or at top level).
    pub fn add_folder(&mut self, name: impl Into<String>, parent: Option<ItemId>) -> Result<ItemId> {
        self.insert(name.into(), ItemType::Folder, RawRef::Detached, parent)
    }

    /// Add a leaf item under `parent` (or at top level).
    pub fn add_leaf(
        &mut self,
        name: impl Into<String>,
        raw: RawRef,
        parent: Option<ItemId>,
    ) -> Result<ItemId> {
        self.insert(name.into(), ItemType::Item, raw, parent)
    }

    /// Add a leaf at the given path, auto-creating folder parents.
    ///
    /// `components` is the full path of the leaf: zero or more folder names
    /// followed by the leaf name. Folders are created on demand and reused
    /// when a folder of the same name already exists at that position.
    pub fn add_leaf_at_path(&mut self, components: &[&str], raw: RawRef) -> Result<ItemId> {
        let (leaf_name, folders) = components
            .split_last()
            .ok_or_else(|| Error::Validation("empty item path".into()))?;

        let mut parent = None;
        for folder in folders {
            parent = Some(self.ensure_folder(folder, parent)?);
        }

        self.add_leaf(*leaf_name, raw, parent)
    }

    fn ensure_folder(&mut self, name: &str, parent: Option<ItemId>) -> Result<ItemId> {
        let existing = self
            .children_of(parent)
            .iter()
            .copied()
            .find(|&id| self.item(id).is_folder() && self.item(id).orig_name == name);

        match existing {
            Some(id) => Ok(id),
            None => self.add_folder(name, parent),
        }
    }

    fn insert(
        &mut self,
        name: String,
        item_type: ItemType,
        raw: RawRef,
        parent: Option<ItemId>,
    ) -> Result<ItemId> {
        if let Some(parent_id) = parent {
            if !self.item(parent_id).is_folder() {
                return Err(Error::Validation(format!(
                    "cannot add \"{name}\" under leaf item {parent_id}"
                )));
            }
        }

        let id = ItemId(self.items.len() as u32);
        let item = Item {
            id,
            item_type,
            name: name.clone(),
            raw,
            parent,
            children: Vec::new(),
            orig_name: name,
            orig_parent: parent,
        };
        self.items.push(Some(item));

        match parent {
            Some(parent_id) => self.item_mut(parent_id).children.push(id),
            None => self.top_level.push(id),
        }

        let key = (self.orig_path_components(id), item_type);
        self.by_key.entry(key).or_insert(id);

        Ok(id)
    }

    /// The item for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this tree or was removed; ids are
    /// only obtainable from this tree's own insertion and iteration methods.
    pub fn item(&self, id: ItemId) -> &Item {
        self.items[id.0 as usize]
            .as_ref()
            .expect("item id used after removal")
    }

    /// Mutable access to the item for `id`.
    pub fn item_mut(&mut self, id: ItemId) -> &mut Item {
        self.items[id.0 as usize]
            .as_mut()
            .expect("item id used after removal")
    }

    /// Look up an item by the `orig_name` path it was added under.
    pub fn lookup(&self, path: &[&str], item_type: ItemType) -> Option<ItemId> {
        let key = (
            path.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            item_type,
        );
        self.by_key.get(&key).copied()
    }

    /// Ancestors of `id`, ordered root first, immediate parent last.
    pub fn parents_of(&self, id: ItemId) -> Vec<ItemId> {
        let mut chain = Vec::new();
        let mut current = self.item(id).parent;
        while let Some(parent_id) = current {
            chain.push(parent_id);
            current = self.item(parent_id).parent;
        }
        chain.reverse();
        chain
    }

    /// `name`s of the ancestors of `id`, root first.
    pub fn parent_names(&self, id: ItemId) -> Vec<String> {
        self.parents_of(id)
            .into_iter()
            .map(|pid| self.item(pid).name.clone())
            .collect()
    }

    fn orig_path_components(&self, id: ItemId) -> Vec<String> {
        let mut components: Vec<String> = self
            .parents_of(id)
            .into_iter()
            .map(|pid| self.item(pid).orig_name.clone())
            .collect();
        components.push(self.item(id).orig_name.clone());
        components
    }

    fn children_of(&self, parent: Option<ItemId>) -> &[ItemId] {
        match parent {
            Some(id) => &self.item(id).children,
            None => &self.top_level,
        }
    }

    /// Sibling ids of `id` (items sharing its parent), including `id` itself.
    pub fn siblings_of(&self, id: ItemId) -> &[ItemId] {
        self.children_of(self.item(id).parent)
    }

    /// Iterate the whole forest depth-first, folders included.
    ///
    /// Order is top-level insertion order, children before the next sibling.
    pub fn iter(&self) -> impl Iterator<Item = ItemId> + '_ {
        DepthFirstIter::new(self)
    }

    /// Iterate leaf items only, in depth-first order.
    pub fn iter_items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.iter().filter(|&id| !self.item(id).is_folder())
    }

    /// Number of leaf items in the tree.
    pub fn leaf_count(&self) -> usize {
        self.iter_items().count()
    }

    /// Whether the tree has no items at all.
    pub fn is_empty(&self) -> bool {
        self.top_level.is_empty()
    }

    /// Move `id` to the end of the top level, detaching it from its parent.
    ///
    /// Used by folder-structure flattening; `orig_parent` keeps the original
    /// location.
    pub fn reparent_to_top(&mut self, id: ItemId) {
        let parent = self.item(id).parent;
        match parent {
            Some(parent_id) => {
                self.item_mut(parent_id).children.retain(|&child| child != id);
            }
            None => {
                // Already top-level; keep its position.
                return;
            }
        }
        self.item_mut(id).parent = None;
        self.top_level.push(id);
    }

    /// Remove folders that no longer have any children, recursively.
    pub fn remove_empty_folders(&mut self) {
        loop {
            let empty: Vec<ItemId> = self
                .iter()
                .filter(|&id| self.item(id).is_folder() && self.item(id).children.is_empty())
                .collect();
            if empty.is_empty() {
                return;
            }
            for id in empty {
                let parent = self.item(id).parent;
                match parent {
                    Some(parent_id) => self
                        .item_mut(parent_id)
                        .children
                        .retain(|&child| child != id),
                    None => self.top_level.retain(|&top| top != id),
                }
                self.items[id.0 as usize] = None;
            }
        }
    }
}

struct DepthFirstIter<'a> {
    tree: &'a ItemTree,
    stack: Vec<ItemId>,
}

impl<'a> DepthFirstIter<'a> {
    fn new(tree: &'a ItemTree) -> Self {
        let mut stack = tree.top_level.clone();
        stack.reverse();
        Self { tree, stack }
    }
}

impl Iterator for DepthFirstIter<'_> {
    type Item = ItemId;

    fn next(&mut self) -> Option<ItemId> {
        let id = self.stack.pop()?;
        let children = &self.tree.item(id).children;
        self.stack.extend(children.iter().rev().copied());
        Some(id)
    }
}
