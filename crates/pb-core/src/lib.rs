//! pb-core: shared types, handles, errors, and configuration primitives.
//!
//! This crate is the foundational dependency for all other pb-* crates,
//! providing typed handles for host-session objects, a unified error type,
//! and the configuration enums shared between the engine and its drivers.

pub mod color;
pub mod config;
pub mod error;
pub mod ids;

// Re-export the most commonly used items at the crate root.
pub use color::ColorTag;
pub use config::{FailurePolicy, OverwriteMode};
pub use error::{Error, Result};
pub use ids::{ImageId, LayerId};
