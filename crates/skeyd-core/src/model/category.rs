// ── Action categories ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// The scanner menu class a button press belongs to.
///
/// The wire form is the upper-case name (`FUNC=FILE`); every category also
/// carries a fixed numeric application code (`APPNUM`) that devices echo
/// back as a corruption check.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ActionCategory {
    File,
    Image,
    Ocr,
    Email,
}

impl ActionCategory {
    /// Application code paired with this category on the wire.
    pub const fn app_num(self) -> u32 {
        match self {
            Self::File => 5,
            Self::Image => 1,
            Self::Ocr => 3,
            Self::Email => 2,
        }
    }

    /// Wire name, e.g. `"FILE"`.
    pub fn as_wire(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for category in ActionCategory::iter() {
            assert_eq!(ActionCategory::from_str(category.as_wire()), Ok(category));
        }
        assert_eq!(ActionCategory::Ocr.to_string(), "OCR");
    }

    #[test]
    fn app_numbers_are_distinct() {
        let mut codes: Vec<u32> = ActionCategory::iter().map(ActionCategory::app_num).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes, vec![1, 2, 3, 5]);
    }

    #[test]
    fn lower_case_names_are_not_wire_names() {
        assert!(ActionCategory::from_str("file").is_err());
    }
}
