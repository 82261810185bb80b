//! pb-tree: the item tree model and the naming machinery built on top of it.
//!
//! An [`ItemTree`] is an ordered forest of items (leaf images/layers and
//! folders) built once per batch run and mutated in place as actions rename
//! and restructure it. [`ItemUniquifier`] resolves sibling name collisions
//! deterministically, and [`ItemRenamer`] renders name patterns such as
//! `"image[001]"` against the tree.

pub mod item;
pub mod pattern;
pub mod renamer;
pub mod tree;
pub mod uniquifier;
pub mod uniquify;

// Re-export the most commonly used items at the crate root.
pub use item::{Item, ItemId, ItemType, RawRef};
pub use pattern::StringPattern;
pub use renamer::{ItemRenamer, MatchedCounts, RenameEnv};
pub use tree::ItemTree;
pub use uniquifier::ItemUniquifier;
