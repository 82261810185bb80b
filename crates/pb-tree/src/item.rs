//! A single processable unit in an [`ItemTree`](crate::ItemTree).

use std::path::{Path, PathBuf};

use pb_core::{ImageId, LayerId};

/// Identifier of an item within one [`ItemTree`](crate::ItemTree).
///
/// Ids are stable for the lifetime of the tree; they are never reused, even
/// after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub(crate) u32);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether an item is a processable leaf or a grouping folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    /// A leaf item: an image file or a layer-like entity.
    Item,
    /// A folder or group. Never processed by actions itself; only its
    /// descendants are.
    Folder,
}

/// Reference to the native object an item wraps.
///
/// The referent is owned by the host session (or the filesystem), not by the
/// tree; the engine may swap a `File` reference for an `Image` handle after
/// loading the file and back to `Detached` once the loaded copy is disposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRef {
    /// An image file on disk, not yet opened in the host session.
    File(PathBuf),
    /// An image open in the host session.
    Image(ImageId),
    /// A layer within a host image.
    Layer(LayerId),
    /// No native object (folders, or leaves whose loaded copy was disposed).
    Detached,
}

impl RawRef {
    /// The file path, if this reference points at a file.
    pub fn as_file(&self) -> Option<&Path> {
        match self {
            RawRef::File(path) => Some(path),
            _ => None,
        }
    }

    /// The image handle, if this reference points at an open image.
    pub fn as_image(&self) -> Option<ImageId> {
        match self {
            RawRef::Image(id) => Some(*id),
            _ => None,
        }
    }

    /// The layer handle, if this reference points at a layer.
    pub fn as_layer(&self) -> Option<LayerId> {
        match self {
            RawRef::Layer(id) => Some(*id),
            _ => None,
        }
    }
}

/// One node of an [`ItemTree`](crate::ItemTree).
///
/// `name` is the mutable display/output name actions operate on;
/// `orig_name` and `orig_parent` are snapshots captured when the item was
/// added, so renames and reparenting performed during a run can be detected
/// and keyed lookup stays stable.
#[derive(Debug, Clone)]
pub struct Item {
    pub(crate) id: ItemId,
    pub(crate) item_type: ItemType,
    /// Mutable display/output name.
    pub name: String,
    /// Reference to the wrapped native object.
    pub raw: RawRef,
    pub(crate) parent: Option<ItemId>,
    pub(crate) children: Vec<ItemId>,
    pub(crate) orig_name: String,
    pub(crate) orig_parent: Option<ItemId>,
}

impl Item {
    /// The item's identifier within its tree.
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Whether the item is a leaf or a folder.
    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    /// Whether this item is a folder.
    pub fn is_folder(&self) -> bool {
        self.item_type == ItemType::Folder
    }

    /// The current parent, if any.
    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    /// Child items, in order. Empty for leaves.
    pub fn children(&self) -> &[ItemId] {
        &self.children
    }

    /// The name the item had when it was added to the tree.
    pub fn orig_name(&self) -> &str {
        &self.orig_name
    }

    /// The parent the item had when it was added to the tree.
    pub fn orig_parent(&self) -> Option<ItemId> {
        self.orig_parent
    }
}
