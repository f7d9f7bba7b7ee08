use serde::{Deserialize, Serialize};
use std::fmt;

/// Safety quality of a service instance or consumer.
///
/// `Invalid` exists only as a placeholder default — the upstream C++
/// (`quality_type.h`) keeps the same three-way discriminant, including the
/// explicit `kInvalid = 0x00` that is never a real instance's quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityType {
    #[default]
    Invalid,
    AsilQm,
    AsilB,
}

impl QualityType {
    /// Parses the discovery-tree flag-file quality suffix (`"asil-qm"` /
    /// `"asil-b"`). Anything else maps to `Invalid` — the caller decides
    /// whether that is a fault.
    pub fn parse_from_string(value: &str) -> QualityType {
        match value {
            "asil-qm" => QualityType::AsilQm,
            "asil-b" => QualityType::AsilB,
            _ => QualityType::Invalid,
        }
    }

    /// True if `self` does not exceed `process_quality`.
    pub fn is_within(self, process_quality: QualityType) -> bool {
        self <= process_quality
    }
}

impl fmt::Display for QualityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityType::Invalid => "Invalid",
            QualityType::AsilQm => "QM",
            QualityType::AsilB => "B",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_suffixes() {
        assert_eq!(QualityType::parse_from_string("asil-qm"), QualityType::AsilQm);
        assert_eq!(QualityType::parse_from_string("asil-b"), QualityType::AsilB);
    }

    #[test]
    fn unknown_suffix_is_invalid() {
        assert_eq!(QualityType::parse_from_string("bogus"), QualityType::Invalid);
        assert_eq!(QualityType::parse_from_string(""), QualityType::Invalid);
    }

    #[test]
    fn ordering_matches_invariant() {
        assert!(QualityType::AsilQm.is_within(QualityType::AsilB));
        assert!(!QualityType::AsilB.is_within(QualityType::AsilQm));
        assert!(QualityType::AsilB.is_within(QualityType::AsilB));
    }
}
