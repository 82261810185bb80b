//! Typed handle wrappers for objects owned by the host session.
//!
//! The engine never touches pixel data directly; it refers to host images
//! and layers through opaque handles issued by the session. Each handle
//! type is a newtype over `u64`, preventing accidental misuse (e.g. passing
//! an `ImageId` where a `LayerId` is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Generate a newtype handle wrapper over `u64`.
///
/// The macro produces a struct with:
/// - `from_raw()` / `as_raw()` conversions for host implementations
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `Ord`,
///   `Serialize`, `Deserialize`
/// - `Display` showing the raw value
macro_rules! typed_handle {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(
                Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
                Serialize, Deserialize,
            )]
            #[serde(transparent)]
            pub struct $name(u64);

            impl $name {
                /// Wrap a raw handle value issued by the host session.
                #[must_use]
                pub const fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                /// Return the raw handle value.
                #[must_use]
                pub const fn as_raw(self) -> u64 {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )+
    };
}

typed_handle! {
    /// Handle for an image open in the host session.
    ImageId,
    /// Handle for a layer within a host image.
    LayerId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_raw_value() {
        let id = ImageId::from_raw(7);
        assert_eq!(id.as_raw(), 7);
        assert_eq!(id.to_string(), "7");
    }

    #[test]
    fn handles_are_distinct_types() {
        // Compiles only because ImageId and LayerId are separate types;
        // equality is per-type.
        assert_eq!(LayerId::from_raw(1), LayerId::from_raw(1));
        assert_ne!(ImageId::from_raw(1), ImageId::from_raw(2));
    }

    #[test]
    fn serde_transparent() {
        let id = LayerId::from_raw(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");
        let back: LayerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
