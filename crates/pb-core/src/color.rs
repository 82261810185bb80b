//! Color tags attached to layers by the host application.
//!
//! Tags carry no pixel meaning of their own; the engine uses them to pair
//! "insert background/foreground" actions with their matching merge actions
//! and to filter items by tag.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A color tag assigned to a layer (or to no layer) in the host session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTag {
    /// No tag assigned.
    #[default]
    None,
    Blue,
    Green,
    Yellow,
    Orange,
    Brown,
    Red,
    Violet,
    Gray,
}

impl ColorTag {
    /// Whether this is the absence of a tag.
    pub fn is_none(self) -> bool {
        self == ColorTag::None
    }
}

impl fmt::Display for ColorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorTag::None => "none",
            ColorTag::Blue => "blue",
            ColorTag::Green => "green",
            ColorTag::Yellow => "yellow",
            ColorTag::Orange => "orange",
            ColorTag::Brown => "brown",
            ColorTag::Red => "red",
            ColorTag::Violet => "violet",
            ColorTag::Gray => "gray",
        };
        write!(f, "{name}")
    }
}
