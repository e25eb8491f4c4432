// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration selectors: a name or an integer code.
//!
//! Enum selectors deserialize through their `from_name` / `from_code`
//! decoders, so an unrecognized value falls back to the default variant
//! with a warning instead of failing the whole document.

use serde::Deserialize;

/// Raw selector as it appears in a configuration document.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Selector {
    Code(i32),
    Name(String),
}

/// `Deserialize` for a selector enum with `from_code` and `from_name`.
macro_rules! deserialize_via_selector {
    ($ty:ty) => {
        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Ok(match <$crate::lattice::selector::Selector as serde::Deserialize>::deserialize(
                    deserializer,
                )? {
                    $crate::lattice::selector::Selector::Code(code) => Self::from_code(code),
                    $crate::lattice::selector::Selector::Name(name) => Self::from_name(&name),
                })
            }
        }
    };
}

pub(crate) use deserialize_via_selector;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_codes() {
        assert_eq!(
            serde_json::from_str::<Selector>(r#""naik""#).unwrap(),
            Selector::Name("naik".into())
        );
        assert_eq!(serde_json::from_str::<Selector>("2").unwrap(), Selector::Code(2));
        assert!(serde_json::from_str::<Selector>("[1]").is_err());
    }
}
