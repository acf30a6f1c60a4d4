//! String collations.
//!
//! Statistics store raw bytes. A collation is "binary" when those bytes are
//! enough to reproduce the comparison result; every other collation needs the
//! original string, which encoded statistics cannot give back.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Supported collations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Collation {
    /// Plain byte comparison.
    #[default]
    Binary,
    /// Byte comparison with PAD SPACE semantics.
    Utf8Mb4Bin,
    /// ASCII case-insensitive comparison with PAD SPACE semantics.
    Utf8Mb4GeneralCi,
}

impl Collation {
    /// Whether comparisons can be reproduced from the stored bytes alone.
    #[must_use]
    pub const fn is_bin(self) -> bool {
        matches!(self, Self::Binary | Self::Utf8Mb4Bin)
    }

    /// Stable collation name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Utf8Mb4Bin => "utf8mb4_bin",
            Self::Utf8Mb4GeneralCi => "utf8mb4_general_ci",
        }
    }

    /// Sort key of `s`; two strings compare equal under this collation iff
    /// their keys are equal.
    #[must_use]
    pub fn key(self, s: &str) -> Vec<u8> {
        match self {
            Self::Binary => s.as_bytes().to_vec(),
            Self::Utf8Mb4Bin => s.trim_end_matches(' ').as_bytes().to_vec(),
            Self::Utf8Mb4GeneralCi => s
                .trim_end_matches(' ')
                .bytes()
                .map(|b| b.to_ascii_uppercase())
                .collect(),
        }
    }

    /// Compare two strings under this collation.
    #[must_use]
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            Self::Binary => a.as_bytes().cmp(b.as_bytes()),
            _ => self.key(a).cmp(&self.key(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_space_and_case() {
        assert_eq!(Collation::Binary.compare("a ", "a"), Ordering::Greater);
        assert_eq!(Collation::Utf8Mb4Bin.compare("a ", "a"), Ordering::Equal);
        assert_eq!(Collation::Utf8Mb4Bin.compare("A", "a"), Ordering::Less);
        assert_eq!(Collation::Utf8Mb4GeneralCi.compare("ABC  ", "abc"), Ordering::Equal);
    }

    #[test]
    fn test_bin_classification() {
        assert!(Collation::Binary.is_bin());
        assert!(Collation::Utf8Mb4Bin.is_bin());
        assert!(!Collation::Utf8Mb4GeneralCi.is_bin());
    }
}
