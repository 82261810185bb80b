//! Insertion and merging of background/foreground content.
//!
//! Insert actions bring transient content into the current item's working
//! image (a file loaded once per run, or color-tagged layers of the image
//! itself). The content is never added to the item tree; it exists only
//! through `current_image`, and anything loaded is registered for disposal
//! on the cleanup group. Merge actions fold the adjacent inserted layer
//! into the current layer, paired with their insert action through the
//! color-tag scan in [`nearest_insert_color_tag`].

use std::path::PathBuf;

use pb_core::{ColorTag, Error, ImageId, LayerId, Result};

use crate::actions::BuiltinAction;
use crate::batcher::RunState;
use crate::command::{ArgValue, Command};
use crate::placeholders::ResolvedArgs;

/// Which side of the current layer an action works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjacentSide {
    /// Directly behind the current layer (background).
    Behind,
    /// Directly in front of the current layer (foreground).
    InFront,
}

impl AdjacentSide {
    fn insert_orig_name(self) -> &'static str {
        match self {
            AdjacentSide::Behind => "insert_background",
            AdjacentSide::InFront => "insert_foreground",
        }
    }

    fn missing_message(self) -> &'static str {
        match self {
            AdjacentSide::Behind => "there are no background layers",
            AdjacentSide::InFront => "there are no foreground layers",
        }
    }
}

/// The color tag configured on the nearest preceding enabled insert action.
///
/// Scans `actions[..current_index]` backward for an enabled command whose
/// `orig_name` is `insert_orig_name` and reads its `color_tag` argument.
/// `None` means no such action exists, in which case adjacency carries no
/// tag constraint.
pub fn nearest_insert_color_tag(
    actions: &[Command],
    current_index: usize,
    insert_orig_name: &str,
) -> Option<ColorTag> {
    actions[..current_index.min(actions.len())]
        .iter()
        .rev()
        .find(|command| command.enabled && command.orig_name == insert_orig_name)
        .map(|command| match command.argument("color_tag") {
            Some(ArgValue::ColorTag(tag)) => *tag,
            _ => ColorTag::None,
        })
}

/// The layer adjacent to the current layer on the given side, honoring the
/// color-tag pairing of the nearest preceding enabled insert action.
///
/// Raises [`Error::Skip`] when no qualifying layer exists, so merge actions
/// and placeholder resolution degrade to a recorded per-item skip.
pub fn adjacent_layer(state: &RunState<'_>, side: AdjacentSide) -> Result<LayerId> {
    let image = state
        .current_image()
        .ok_or_else(|| Error::Validation("no image is being processed".into()))?;
    let layer = state
        .current_layer()
        .ok_or_else(|| Error::skip(side.missing_message()))?;

    let layers = state.host().layers(image)?;
    let position = state.host().layer_position(image, layer)?;

    let adjacent = match side {
        AdjacentSide::Behind => layers.get(position + 1).copied(),
        AdjacentSide::InFront => position.checked_sub(1).map(|p| layers[p]),
    };
    let adjacent = adjacent.ok_or_else(|| Error::skip(side.missing_message()))?;

    let scan_end = state
        .current_action_index()
        .unwrap_or_else(|| state.actions_config().len());
    let required =
        nearest_insert_color_tag(state.actions_config(), scan_end, side.insert_orig_name());

    if let Some(tag) = required {
        if !tag.is_none() && state.host().layer_color_tag(adjacent)? != tag {
            return Err(Error::skip(side.missing_message()));
        }
    }

    Ok(adjacent)
}

/// Inserts background or foreground content next to the current layer.
pub struct Insert {
    side: AdjacentSide,
    image_file: Option<PathBuf>,
    color_tag: ColorTag,
    continue_on_error: bool,
    source_image: Option<ImageId>,
    /// Set when loading failed and the action excused itself for the run.
    disabled: bool,
}

impl Insert {
    pub fn background(command: &Command) -> Self {
        Self::from_command(AdjacentSide::Behind, command)
    }

    pub fn foreground(command: &Command) -> Self {
        Self::from_command(AdjacentSide::InFront, command)
    }

    fn from_command(side: AdjacentSide, command: &Command) -> Self {
        let image_file = match command.argument("image_file") {
            Some(ArgValue::Path(path)) => Some(path.clone()),
            _ => None,
        };
        let color_tag = match command.argument("color_tag") {
            Some(ArgValue::ColorTag(tag)) => *tag,
            _ => ColorTag::None,
        };
        let continue_on_error = matches!(
            command.argument("continue_on_error"),
            Some(ArgValue::Bool(true))
        );

        Self {
            side,
            image_file,
            color_tag,
            continue_on_error,
            source_image: None,
            disabled: false,
        }
    }

    fn insert_position(&self, state: &RunState<'_>) -> Result<usize> {
        let image = state
            .current_image()
            .ok_or_else(|| Error::Validation("no image is being processed".into()))?;
        match state.current_layer() {
            Some(layer) => {
                let position = state.host().layer_position(image, layer)?;
                Ok(match self.side {
                    AdjacentSide::Behind => position + 1,
                    AdjacentSide::InFront => position,
                })
            }
            None => Ok(0),
        }
    }
}

impl BuiltinAction for Insert {
    fn name(&self) -> &'static str {
        self.side.insert_orig_name()
    }

    fn init(&mut self, state: &mut RunState<'_>) -> Result<()> {
        let path = match &self.image_file {
            Some(path) => path.clone(),
            None => return Ok(()),
        };

        match state.host_mut().load_image(&path) {
            Ok(image) => {
                self.source_image = Some(image);
                state.register_cleanup(Box::new(move |state| {
                    if state.host().is_valid_image(image) {
                        state.host_mut().remove_image(image)?;
                    }
                    Ok(())
                }));
                Ok(())
            }
            Err(err) => {
                // Previews must fail loudly; silently dropping the layer
                // would make the predicted output lie.
                if self.continue_on_error && !state.opts().is_preview {
                    tracing::warn!(path = %path.display(), %err, "insert source missing");
                    self.disabled = true;
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    fn step(&mut self, state: &mut RunState<'_>, _args: &ResolvedArgs) -> Result<()> {
        if self.disabled {
            return Ok(());
        }

        let image = state
            .current_image()
            .ok_or_else(|| Error::Validation("no image is being processed".into()))?;
        let position = self.insert_position(state)?;

        if let Some(source) = self.source_image {
            let name = self
                .image_file
                .as_deref()
                .and_then(|path| path.file_stem())
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.name().to_string());
            state
                .host_mut()
                .insert_layer_from_image(image, source, position, &name)?;
            return Ok(());
        }

        if self.color_tag.is_none() {
            return Err(Error::skip("no background/foreground source configured"));
        }

        // Tag mode: copy the tagged layers next to the current layer and
        // merge them into one.
        let current = state.current_layer();
        let mut tagged = Vec::new();
        for layer in state.host().layers(image)? {
            if Some(layer) == current {
                continue;
            }
            if state.host().layer_color_tag(layer)? == self.color_tag {
                tagged.push(layer);
            }
        }

        if tagged.is_empty() {
            return Ok(());
        }

        let count = tagged.len();
        for (offset, layer) in tagged.into_iter().enumerate() {
            state.host_mut().copy_layer(image, layer, position + offset)?;
        }
        for _ in 1..count {
            let layers = state.host().layers(image)?;
            state.host_mut().merge_down(image, layers[position])?;
        }

        Ok(())
    }
}

/// Merges the adjacent inserted layer into the current layer.
pub struct Merge {
    side: AdjacentSide,
}

impl Merge {
    pub fn background() -> Self {
        Self {
            side: AdjacentSide::Behind,
        }
    }

    pub fn foreground() -> Self {
        Self {
            side: AdjacentSide::InFront,
        }
    }
}

impl BuiltinAction for Merge {
    fn name(&self) -> &'static str {
        match self.side {
            AdjacentSide::Behind => "merge_background",
            AdjacentSide::InFront => "merge_foreground",
        }
    }

    fn step(&mut self, state: &mut RunState<'_>, _args: &ResolvedArgs) -> Result<()> {
        let adjacent = adjacent_layer(state, self.side)?;

        let image = state
            .current_image()
            .ok_or_else(|| Error::Validation("no image is being processed".into()))?;
        let current = state
            .current_layer()
            .ok_or_else(|| Error::Validation("no layer is being processed".into()))?;
        let kept_name = state.host().layer_name(current)?;

        // Merging down folds the upper layer into the one behind it; which
        // layer that is depends on the side.
        let merged = match self.side {
            AdjacentSide::Behind => state.host_mut().merge_down(image, current)?,
            AdjacentSide::InFront => state.host_mut().merge_down(image, adjacent)?,
        };

        state.host_mut().set_layer_name(merged, &kept_name)?;
        state.set_current_layer(Some(merged));
        Ok(())
    }
}
