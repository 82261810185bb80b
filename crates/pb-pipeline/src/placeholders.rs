//! Placeholder argument values and their resolution against live run state.
//!
//! A stored command configuration must be replayable across items with
//! different concrete object handles, so object-valued arguments are stored
//! as symbolic placeholders and resolved immediately before each
//! invocation.

use std::path::PathBuf;

use pb_core::{ColorTag, Error, ImageId, LayerId, Result};
use serde::{Deserialize, Serialize};

use crate::actions::background_foreground::{adjacent_layer, AdjacentSide};
use crate::batcher::RunState;
use crate::command::{ArgValue, Argument};

/// A symbolic stand-in for a host object, resolved at invocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placeholder {
    /// The image currently being processed.
    CurrentImage,
    /// The layer currently being processed.
    CurrentLayer,
    /// The layer positioned directly behind the current layer, subject to
    /// the color-tag pairing of the nearest preceding insert action.
    BackgroundLayer,
    /// The layer positioned directly in front of the current layer, subject
    /// to the same pairing.
    ForegroundLayer,
    /// All top-level layers of the current image.
    AllTopLevelLayers,
    /// No value.
    None,
    /// A host-procedure parameter this engine cannot supply; resolves to no
    /// value and is passed through untouched.
    Unsupported,
}

impl Placeholder {
    /// Human-readable name, as shown in configuration UIs.
    pub fn display_name(self) -> &'static str {
        match self {
            Placeholder::CurrentImage => "Current Image",
            Placeholder::CurrentLayer => "Current Layer",
            Placeholder::BackgroundLayer => "Background Layer",
            Placeholder::ForegroundLayer => "Foreground Layer",
            Placeholder::AllTopLevelLayers => "All Layers",
            Placeholder::None => "None",
            Placeholder::Unsupported => "",
        }
    }

    /// Resolve this placeholder against the current run state.
    pub fn resolve(self, state: &RunState<'_>) -> Result<ResolvedValue> {
        match self {
            Placeholder::CurrentImage => state
                .current_image()
                .map(ResolvedValue::Image)
                .ok_or_else(|| Error::Validation("no image is being processed".into())),
            Placeholder::CurrentLayer => state
                .current_layer()
                .map(ResolvedValue::Layer)
                .ok_or_else(|| Error::Validation("no layer is being processed".into())),
            Placeholder::BackgroundLayer => {
                adjacent_layer(state, AdjacentSide::Behind).map(ResolvedValue::Layer)
            }
            Placeholder::ForegroundLayer => {
                adjacent_layer(state, AdjacentSide::InFront).map(ResolvedValue::Layer)
            }
            Placeholder::AllTopLevelLayers => {
                let image = state
                    .current_image()
                    .ok_or_else(|| Error::Validation("no image is being processed".into()))?;
                Ok(ResolvedValue::Layers(state.host().layers(image)?))
            }
            Placeholder::None | Placeholder::Unsupported => Ok(ResolvedValue::None),
        }
    }
}

/// A fully resolved argument value, ready to hand to an implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Path(PathBuf),
    ColorTag(ColorTag),
    Image(ImageId),
    Layer(LayerId),
    Layers(Vec<LayerId>),
    None,
}

/// Ordered named argument values after placeholder substitution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedArgs {
    values: Vec<(String, ResolvedValue)>,
}

impl ResolvedArgs {
    /// The value of the named argument, if present.
    pub fn get(&self, name: &str) -> Option<&ResolvedValue> {
        self.values
            .iter()
            .find(|(argument, _)| argument == name)
            .map(|(_, value)| value)
    }

    /// String argument, or `default` when absent.
    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.get(name) {
            Some(ResolvedValue::Str(value)) => value,
            _ => default,
        }
    }

    /// Bool argument, or `default` when absent.
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.get(name) {
            Some(ResolvedValue::Bool(value)) => *value,
            _ => default,
        }
    }

    /// Path argument, if present.
    pub fn path(&self, name: &str) -> Option<&std::path::Path> {
        match self.get(name) {
            Some(ResolvedValue::Path(value)) => Some(value),
            _ => None,
        }
    }

    /// Color-tag argument, or [`ColorTag::None`] when absent.
    pub fn color_tag(&self, name: &str) -> ColorTag {
        match self.get(name) {
            Some(ResolvedValue::ColorTag(value)) => *value,
            _ => ColorTag::None,
        }
    }

    /// Image argument; fails when absent or of a different kind.
    pub fn image(&self, name: &str) -> Result<ImageId> {
        match self.get(name) {
            Some(ResolvedValue::Image(value)) => Ok(*value),
            other => Err(Error::Validation(format!(
                "argument \"{name}\" is not an image (got {other:?})"
            ))),
        }
    }

    /// Layer argument; fails when absent or of a different kind.
    pub fn layer(&self, name: &str) -> Result<LayerId> {
        match self.get(name) {
            Some(ResolvedValue::Layer(value)) => Ok(*value),
            other => Err(Error::Validation(format!(
                "argument \"{name}\" is not a layer (got {other:?})"
            ))),
        }
    }
}

/// Substitute placeholders in `arguments` against the current run state.
///
/// Literals pass through unchanged; placeholder resolution errors (including
/// the skip raised when no background/foreground layer exists) propagate to
/// the invocation boundary.
pub fn resolve_args(arguments: &[Argument], state: &RunState<'_>) -> Result<ResolvedArgs> {
    let mut values = Vec::with_capacity(arguments.len());

    for argument in arguments {
        let resolved = match &argument.value {
            ArgValue::Str(value) => ResolvedValue::Str(value.clone()),
            ArgValue::Int(value) => ResolvedValue::Int(*value),
            ArgValue::Float(value) => ResolvedValue::Float(*value),
            ArgValue::Bool(value) => ResolvedValue::Bool(*value),
            ArgValue::Path(value) => ResolvedValue::Path(value.clone()),
            ArgValue::ColorTag(value) => ResolvedValue::ColorTag(*value),
            ArgValue::Placeholder(placeholder) => placeholder.resolve(state)?,
        };
        values.push((argument.name.clone(), resolved));
    }

    Ok(ResolvedArgs { values })
}
