//! The seam between the engine and the host image-editing application.
//!
//! The engine never manipulates pixels itself; everything it needs from the
//! host session is expressed through [`ImageHost`]. Implementations exist
//! for the real host application and, in the CLI driver, for plain image
//! files on disk. Tests use a small in-memory implementation.
//!
//! Layer positions are top-first: position 0 is the topmost layer, so the
//! layer *behind* position `p` is at `p + 1`.

use std::path::Path;

use pb_core::{ColorTag, ImageId, LayerId, Result};

/// Operations the engine requires from the host session.
///
/// Handles are owned by the session; [`remove_image`](ImageHost::remove_image)
/// invalidates an image handle and all of its layer handles.
pub trait ImageHost {
    /// Open an image file, returning a handle to the loaded image.
    fn load_image(&mut self, path: &Path) -> Result<ImageId>;

    /// Duplicate an image, including its layer stack.
    fn duplicate_image(&mut self, image: ImageId) -> Result<ImageId>;

    /// Dispose of an image and its layers.
    fn remove_image(&mut self, image: ImageId) -> Result<()>;

    /// Whether the handle still refers to a live image.
    fn is_valid_image(&self, image: ImageId) -> bool;

    /// Top-level layers of an image, topmost first.
    fn layers(&self, image: ImageId) -> Result<Vec<LayerId>>;

    /// The image a layer belongs to.
    fn layer_image(&self, layer: LayerId) -> Result<ImageId>;

    fn layer_name(&self, layer: LayerId) -> Result<String>;

    fn set_layer_name(&mut self, layer: LayerId, name: &str) -> Result<()>;

    fn layer_visible(&self, layer: LayerId) -> Result<bool>;

    fn layer_color_tag(&self, layer: LayerId) -> Result<ColorTag>;

    fn set_layer_color_tag(&mut self, layer: LayerId, tag: ColorTag) -> Result<()>;

    /// Position of a top-level layer within its image, topmost first.
    fn layer_position(&self, image: ImageId, layer: LayerId) -> Result<usize>;

    /// Flatten `source` into a single layer and insert it into `target` at
    /// `position`, returning the new layer.
    fn insert_layer_from_image(
        &mut self,
        target: ImageId,
        source: ImageId,
        position: usize,
        name: &str,
    ) -> Result<LayerId>;

    /// Copy a layer within its image to `position`, returning the copy.
    fn copy_layer(&mut self, image: ImageId, layer: LayerId, position: usize) -> Result<LayerId>;

    /// Merge a layer into the layer directly below it, returning the merged
    /// layer. Fails when there is no layer below.
    fn merge_down(&mut self, image: ImageId, layer: LayerId) -> Result<LayerId>;

    /// Write an image to `path`, with the format chosen from the path's
    /// extension.
    fn export_image(&mut self, image: ImageId, path: &Path) -> Result<()>;
}
