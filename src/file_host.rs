//! A file-backed host session.
//!
//! Stands in for the host image-editing application when pixelbatch runs
//! standalone over plain image files: images are RGBA pixel buffers, layers
//! are stacked buffers composited on export, and handles are issued
//! sequentially. Pixel work is done with the `image` crate.

use std::collections::HashMap;
use std::path::Path;

use image::{imageops, RgbaImage};
use pb_core::{ColorTag, Error, ImageId, LayerId, Result};
use pb_pipeline::ImageHost;

struct FileLayer {
    name: String,
    visible: bool,
    color_tag: ColorTag,
    pixels: RgbaImage,
}

struct FileImage {
    width: u32,
    height: u32,
    layers: Vec<LayerId>,
}

/// In-process host session over image files on disk.
#[derive(Default)]
pub struct FileHost {
    images: HashMap<ImageId, FileImage>,
    layers: HashMap<LayerId, FileLayer>,
    layer_owner: HashMap<LayerId, ImageId>,
    next_id: u64,
}

impl FileHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn image(&self, id: ImageId) -> Result<&FileImage> {
        self.images
            .get(&id)
            .ok_or_else(|| Error::Internal(format!("invalid image handle {id}")))
    }

    fn image_mut(&mut self, id: ImageId) -> Result<&mut FileImage> {
        self.images
            .get_mut(&id)
            .ok_or_else(|| Error::Internal(format!("invalid image handle {id}")))
    }

    fn layer(&self, id: LayerId) -> Result<&FileLayer> {
        self.layers
            .get(&id)
            .ok_or_else(|| Error::Internal(format!("invalid layer handle {id}")))
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut FileLayer> {
        self.layers
            .get_mut(&id)
            .ok_or_else(|| Error::Internal(format!("invalid layer handle {id}")))
    }

    fn add_layer(&mut self, image: ImageId, position: usize, layer: FileLayer) -> Result<LayerId> {
        let id = LayerId::from_raw(self.next_id());
        self.layers.insert(id, layer);
        self.layer_owner.insert(id, image);
        let image = self.image_mut(image)?;
        let position = position.min(image.layers.len());
        image.layers.insert(position, id);
        Ok(id)
    }

    /// Composite an image's visible layers, back to front, onto one canvas.
    fn flatten(&self, id: ImageId) -> Result<RgbaImage> {
        let image = self.image(id)?;
        let mut canvas = RgbaImage::new(image.width, image.height);
        for &layer_id in image.layers.iter().rev() {
            let layer = self.layer(layer_id)?;
            if layer.visible {
                imageops::overlay(&mut canvas, &layer.pixels, 0, 0);
            }
        }
        Ok(canvas)
    }
}

impl ImageHost for FileHost {
    fn load_image(&mut self, path: &Path) -> Result<ImageId> {
        let pixels = image::open(path)
            .map_err(|err| Error::file_load(format!("cannot load image ({err})"), path))?
            .to_rgba8();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let id = ImageId::from_raw(self.next_id());
        self.images.insert(
            id,
            FileImage {
                width: pixels.width(),
                height: pixels.height(),
                layers: Vec::new(),
            },
        );
        self.add_layer(
            id,
            0,
            FileLayer {
                name,
                visible: true,
                color_tag: ColorTag::None,
                pixels,
            },
        )?;
        Ok(id)
    }

    fn duplicate_image(&mut self, image: ImageId) -> Result<ImageId> {
        let (width, height, layer_ids) = {
            let original = self.image(image)?;
            (original.width, original.height, original.layers.clone())
        };

        let copy = ImageId::from_raw(self.next_id());
        self.images.insert(
            copy,
            FileImage {
                width,
                height,
                layers: Vec::new(),
            },
        );
        for (position, layer_id) in layer_ids.into_iter().enumerate() {
            let layer = self.layer(layer_id)?;
            let cloned = FileLayer {
                name: layer.name.clone(),
                visible: layer.visible,
                color_tag: layer.color_tag,
                pixels: layer.pixels.clone(),
            };
            self.add_layer(copy, position, cloned)?;
        }
        Ok(copy)
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
        Ok(())
    }

    fn is_valid_image(&self, image: ImageId) -> bool {
        self.images.contains_key(&image)
    }

    fn layers(&self, image: ImageId) -> Result<Vec<LayerId>> {
        Ok(self.image(image)?.layers.clone())
    }

    fn layer_image(&self, layer: LayerId) -> Result<ImageId> {
        self.layer_owner
            .get(&layer)
            .copied()
            .ok_or_else(|| Error::Internal(format!("invalid layer handle {layer}")))
    }

    fn layer_name(&self, layer: LayerId) -> Result<String> {
        Ok(self.layer(layer)?.name.clone())
    }

    fn set_layer_name(&mut self, layer: LayerId, name: &str) -> Result<()> {
        self.layer_mut(layer)?.name = name.to_string();
        Ok(())
    }

    fn layer_visible(&self, layer: LayerId) -> Result<bool> {
        Ok(self.layer(layer)?.visible)
    }

    fn layer_color_tag(&self, layer: LayerId) -> Result<ColorTag> {
        Ok(self.layer(layer)?.color_tag)
    }

    fn set_layer_color_tag(&mut self, layer: LayerId, tag: ColorTag) -> Result<()> {
        self.layer_mut(layer)?.color_tag = tag;
        Ok(())
    }

    fn layer_position(&self, image: ImageId, layer: LayerId) -> Result<usize> {
        self.image(image)?
            .layers
            .iter()
            .position(|&l| l == layer)
            .ok_or_else(|| Error::Internal(format!("layer {layer} not in image {image}")))
    }

    fn insert_layer_from_image(
        &mut self,
        target: ImageId,
        source: ImageId,
        position: usize,
        name: &str,
    ) -> Result<LayerId> {
        let pixels = self.flatten(source)?;
        self.add_layer(
            target,
            position,
            FileLayer {
                name: name.to_string(),
                visible: true,
                color_tag: ColorTag::None,
                pixels,
            },
        )
    }

    fn copy_layer(&mut self, image: ImageId, layer: LayerId, position: usize) -> Result<LayerId> {
        let original = self.layer(layer)?;
        let cloned = FileLayer {
            name: original.name.clone(),
            visible: original.visible,
            color_tag: original.color_tag,
            pixels: original.pixels.clone(),
        };
        self.add_layer(image, position, cloned)
    }

    fn merge_down(&mut self, image: ImageId, layer: LayerId) -> Result<LayerId> {
        let position = self.layer_position(image, layer)?;
        let below = {
            let image = self.image(image)?;
            *image
                .layers
                .get(position + 1)
                .ok_or_else(|| Error::Internal("no layer below to merge into".into()))?
        };

        let upper = self
            .layers
            .remove(&layer)
            .ok_or_else(|| Error::Internal(format!("invalid layer handle {layer}")))?;
        self.layer_owner.remove(&layer);

        let lower = self.layer_mut(below)?;
        imageops::overlay(&mut lower.pixels, &upper.pixels, 0, 0);

        self.image_mut(image)?.layers.remove(position);
        Ok(below)
    }

    fn export_image(&mut self, image: ImageId, path: &Path) -> Result<()> {
        let flat = self.flatten(image)?;

        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        // JPEG has no alpha channel.
        let result = match extension.as_str() {
            "jpg" | "jpeg" => image::DynamicImage::ImageRgba8(flat).to_rgb8().save(path),
            _ => flat.save(path),
        };

        result.map_err(|err| Error::Export {
            message: err.to_string(),
            item_name: None,
            file_extension: Some(extension),
        })
    }
}
