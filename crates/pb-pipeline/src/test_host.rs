//! In-memory [`ImageHost`] used by the unit tests of this crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pb_core::{ColorTag, Error, ImageId, LayerId, Result};

use crate::host::ImageHost;

#[derive(Debug, Clone)]
pub(crate) struct FakeLayer {
    pub name: String,
    pub visible: bool,
    pub color_tag: ColorTag,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeImage {
    pub source: Option<PathBuf>,
    pub layers: Vec<LayerId>,
}

/// In-memory host session. Images are layer stacks without pixel data;
/// exports record the written path instead of touching the filesystem.
#[derive(Debug, Default)]
pub(crate) struct FakeHost {
    images: HashMap<ImageId, FakeImage>,
    layers: HashMap<LayerId, FakeLayer>,
    layer_owner: HashMap<LayerId, ImageId>,
    next_id: u64,
    /// Paths of files "missing" from the fake filesystem.
    pub missing_files: Vec<PathBuf>,
    /// Every successful export, in order.
    pub exports: Vec<(ImageId, PathBuf)>,
    /// Images disposed via `remove_image`, in order.
    pub removed_images: Vec<ImageId>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Create an image with the given `(name, color_tag)` layers, topmost
    /// first.
    pub fn add_image(&mut self, layers: &[(&str, ColorTag)]) -> ImageId {
        let image_id = ImageId::from_raw(self.next_id());
        let mut layer_ids = Vec::new();
        for &(name, color_tag) in layers {
            let layer_id = LayerId::from_raw(self.next_id());
            self.layers.insert(
                layer_id,
                FakeLayer {
                    name: name.to_string(),
                    visible: true,
                    color_tag,
                },
            );
            self.layer_owner.insert(layer_id, image_id);
            layer_ids.push(layer_id);
        }
        self.images.insert(
            image_id,
            FakeImage {
                source: None,
                layers: layer_ids,
            },
        );
        image_id
    }

    pub fn layer(&self, id: LayerId) -> &FakeLayer {
        &self.layers[&id]
    }

    pub fn image(&self, id: ImageId) -> &FakeImage {
        &self.images[&id]
    }

    fn image_mut(&mut self, id: ImageId) -> Result<&mut FakeImage> {
        self.images
            .get_mut(&id)
            .ok_or_else(|| Error::Internal(format!("invalid image handle {id}")))
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut FakeLayer> {
        self.layers
            .get_mut(&id)
            .ok_or_else(|| Error::Internal(format!("invalid layer handle {id}")))
    }
}

impl ImageHost for FakeHost {
    fn load_image(&mut self, path: &Path) -> Result<ImageId> {
        if self.missing_files.iter().any(|missing| missing == path) {
            return Err(Error::file_load("file not found", path));
        }
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let image = self.add_image(&[(&name, ColorTag::None)]);
        self.images
            .get_mut(&image)
            .expect("just added")
            .source = Some(path.to_path_buf());
        Ok(image)
    }

    fn duplicate_image(&mut self, image: ImageId) -> Result<ImageId> {
        let original = self
            .images
            .get(&image)
            .ok_or_else(|| Error::Internal(format!("invalid image handle {image}")))?
            .clone();
        let copy_id = ImageId::from_raw(self.next_id());
        let mut copied_layers = Vec::new();
        for layer_id in original.layers {
            let layer = self.layers[&layer_id].clone();
            let copy_layer_id = LayerId::from_raw(self.next_id());
            self.layers.insert(copy_layer_id, layer);
            self.layer_owner.insert(copy_layer_id, copy_id);
            copied_layers.push(copy_layer_id);
        }
        self.images.insert(
            copy_id,
            FakeImage {
                source: original.source,
                layers: copied_layers,
            },
        );
        Ok(copy_id)
    }

    fn remove_image(&mut self, image: ImageId) -> Result<()> {
        let removed = self
            .images
            .remove(&image)
            .ok_or_else(|| Error::Internal(format!("invalid image handle {image}")))?;
        for layer in removed.layers {
            self.layers.remove(&layer);
            self.layer_owner.remove(&layer);
        }
        self.removed_images.push(image);
        Ok(())
    }

    fn is_valid_image(&self, image: ImageId) -> bool {
        self.images.contains_key(&image)
    }

    fn layers(&self, image: ImageId) -> Result<Vec<LayerId>> {
        self.images
            .get(&image)
            .map(|img| img.layers.clone())
            .ok_or_else(|| Error::Internal(format!("invalid image handle {image}")))
    }

    fn layer_image(&self, layer: LayerId) -> Result<ImageId> {
        self.layer_owner
            .get(&layer)
            .copied()
            .ok_or_else(|| Error::Internal(format!("invalid layer handle {layer}")))
    }

    fn layer_name(&self, layer: LayerId) -> Result<String> {
        Ok(self
            .layers
            .get(&layer)
            .ok_or_else(|| Error::Internal(format!("invalid layer handle {layer}")))?
            .name
            .clone())
    }

    fn set_layer_name(&mut self, layer: LayerId, name: &str) -> Result<()> {
        self.layer_mut(layer)?.name = name.to_string();
        Ok(())
    }

    fn layer_visible(&self, layer: LayerId) -> Result<bool> {
        Ok(self
            .layers
            .get(&layer)
            .ok_or_else(|| Error::Internal(format!("invalid layer handle {layer}")))?
            .visible)
    }

    fn layer_color_tag(&self, layer: LayerId) -> Result<ColorTag> {
        Ok(self
            .layers
            .get(&layer)
            .ok_or_else(|| Error::Internal(format!("invalid layer handle {layer}")))?
            .color_tag)
    }

    fn set_layer_color_tag(&mut self, layer: LayerId, tag: ColorTag) -> Result<()> {
        self.layer_mut(layer)?.color_tag = tag;
        Ok(())
    }

    fn layer_position(&self, image: ImageId, layer: LayerId) -> Result<usize> {
        self.images
            .get(&image)
            .and_then(|img| img.layers.iter().position(|&l| l == layer))
            .ok_or_else(|| Error::Internal(format!("layer {layer} not in image {image}")))
    }

    fn insert_layer_from_image(
        &mut self,
        target: ImageId,
        source: ImageId,
        position: usize,
        name: &str,
    ) -> Result<LayerId> {
        if !self.images.contains_key(&source) {
            return Err(Error::Internal(format!("invalid image handle {source}")));
        }
        let layer_id = LayerId::from_raw(self.next_id());
        self.layers.insert(
            layer_id,
            FakeLayer {
                name: name.to_string(),
                visible: true,
                color_tag: ColorTag::None,
            },
        );
        self.layer_owner.insert(layer_id, target);
        let image = self.image_mut(target)?;
        let position = position.min(image.layers.len());
        image.layers.insert(position, layer_id);
        Ok(layer_id)
    }

    fn copy_layer(&mut self, image: ImageId, layer: LayerId, position: usize) -> Result<LayerId> {
        let copied = self
            .layers
            .get(&layer)
            .ok_or_else(|| Error::Internal(format!("invalid layer handle {layer}")))?
            .clone();
        let copy_id = LayerId::from_raw(self.next_id());
        self.layers.insert(copy_id, copied);
        self.layer_owner.insert(copy_id, image);
        let img = self.image_mut(image)?;
        let position = position.min(img.layers.len());
        img.layers.insert(position, copy_id);
        Ok(copy_id)
    }

    fn merge_down(&mut self, image: ImageId, layer: LayerId) -> Result<LayerId> {
        let position = self.layer_position(image, layer)?;
        let img = self.image_mut(image)?;
        if position + 1 >= img.layers.len() {
            return Err(Error::Internal("no layer below to merge into".into()));
        }
        let below = img.layers[position + 1];
        img.layers.remove(position);
        self.layers.remove(&layer);
        self.layer_owner.remove(&layer);
        Ok(below)
    }

    fn export_image(&mut self, image: ImageId, path: &Path) -> Result<()> {
        if !self.images.contains_key(&image) {
            return Err(Error::export(format!("invalid image handle {image}")));
        }
        self.exports.push((image, path.to_path_buf()));
        Ok(())
    }
}
