//! Column and index ranges.
//!
//! A range over `n` columns is the interval `[low, high]` of `n`-tuples, with
//! per-side exclusivity applying to the whole tuple. Prefix positions where
//! `low == high` are equality conditions.

use std::fmt;

use optstats_error::Result;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::collate::Collation;
use crate::datum::Datum;

/// Inline storage for the values of one range side.
pub type DatumVec = SmallVec<[Datum; 4]>;

/// Longest enumeration [`enum_range_values`] produces.
pub const MAX_ENUM_STEPS: u64 = 10;

/// An interval over one or more columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub low: DatumVec,
    pub high: DatumVec,
    pub low_exclude: bool,
    pub high_exclude: bool,
    pub collators: SmallVec<[Collation; 4]>,
}

impl Range {
    /// Range with binary collators for every position.
    #[must_use]
    pub fn new(
        low: impl IntoIterator<Item = Datum>,
        high: impl IntoIterator<Item = Datum>,
        low_exclude: bool,
        high_exclude: bool,
    ) -> Self {
        let low: DatumVec = low.into_iter().collect();
        let high: DatumVec = high.into_iter().collect();
        let collators = std::iter::repeat_n(Collation::Binary, low.len()).collect();
        Self {
            low,
            high,
            low_exclude,
            high_exclude,
            collators,
        }
    }

    /// Closed range `[values, values]`.
    #[must_use]
    pub fn point(values: impl IntoIterator<Item = Datum>) -> Self {
        let low: DatumVec = values.into_iter().collect();
        let high = low.clone();
        Self::new(low, high, false, false)
    }

    /// `(-inf, +inf)` over non-null values of one column.
    #[must_use]
    pub fn full_not_null() -> Self {
        Self::new([Datum::MinNotNull], [Datum::MaxValue], false, false)
    }

    /// Replace the collators.
    #[must_use]
    pub fn with_collators(mut self, collators: impl IntoIterator<Item = Collation>) -> Self {
        self.collators = collators.into_iter().collect();
        self
    }

    /// Collator for position `i`, binary when unspecified.
    #[must_use]
    pub fn collator(&self, i: usize) -> Collation {
        self.collators.get(i).copied().unwrap_or_default()
    }

    /// Single-column sub-range built from position `i` of both sides.
    #[must_use]
    pub fn column_at(&self, i: usize, low_exclude: bool, high_exclude: bool) -> Self {
        let mut out = Self::new(
            [self.low[i].clone()],
            [self.high[i].clone()],
            low_exclude,
            high_exclude,
        );
        out.collators = SmallVec::from_elem(self.collator(i), 1);
        out
    }

    /// Number of leading positions where low equals high.
    ///
    /// # Errors
    ///
    /// Propagates comparison failures.
    pub fn prefix_equal_len(&self) -> Result<usize> {
        for (i, (l, h)) in self.low.iter().zip(self.high.iter()).enumerate() {
            if !l.compare(h, self.collator(i))?.is_eq() {
                return Ok(i);
            }
        }
        Ok(self.low.len())
    }

    /// Position of the first non-equality condition, or the width of the
    /// range when every position is an equality. Comparison failures count as
    /// position 0.
    #[must_use]
    pub fn ordinal_of_range_cond(&self) -> usize {
        self.prefix_equal_len().unwrap_or(0)
    }

    /// Whether the range selects one non-null tuple.
    ///
    /// # Errors
    ///
    /// Propagates comparison failures.
    pub fn is_point_non_null(&self) -> Result<bool> {
        if self.low.iter().any(Datum::is_null) {
            return Ok(false);
        }
        self.is_point_nullable()
    }

    /// Whether the range selects one tuple, NULLs allowed.
    ///
    /// # Errors
    ///
    /// Propagates comparison failures.
    pub fn is_point_nullable(&self) -> Result<bool> {
        if self.low_exclude || self.high_exclude || self.low.len() != self.high.len() {
            return Ok(false);
        }
        if self.low.iter().any(Datum::is_sentinel) {
            return Ok(false);
        }
        Ok(self.prefix_equal_len()? == self.low.len())
    }

    /// Whether this is `[NULL, NULL]` on its first column.
    #[must_use]
    pub fn is_null_point(&self) -> bool {
        matches!(
            (self.low.first(), self.high.first()),
            (Some(Datum::Null), Some(Datum::Null))
        )
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.low_exclude { "(" } else { "[" })?;
        write_values(f, &self.low)?;
        f.write_str(",")?;
        write_values(f, &self.high)?;
        f.write_str(if self.high_exclude { ")" } else { "]" })
    }
}

fn write_values(f: &mut fmt::Formatter<'_>, values: &[Datum]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{v}")?;
    }
    Ok(())
}

/// Enumerate every value of a small integer interval.
///
/// Returns `None` when the bounds differ in kind, are not integers, or span
/// [`MAX_ENUM_STEPS`] or more values.
#[must_use]
pub fn enum_range_values(
    low: &Datum,
    high: &Datum,
    low_exclude: bool,
    high_exclude: bool,
) -> Option<Vec<Datum>> {
    if !low.same_kind(high) {
        return None;
    }
    let exclude = u64::from(low_exclude) + u64::from(high_exclude);
    match (low, high) {
        (Datum::Int(l), Datum::Int(h)) => {
            let span = h.checked_sub(*l)?;
            if span < 0 || span as u64 >= MAX_ENUM_STEPS + 1 {
                return None;
            }
            let remaining = (span as u64 + 1).checked_sub(exclude)?;
            if remaining >= MAX_ENUM_STEPS {
                return None;
            }
            let start = if low_exclude { l + 1 } else { *l };
            Some((0..remaining as i64).map(|i| Datum::Int(start + i)).collect())
        }
        (Datum::Uint(l), Datum::Uint(h)) => {
            let span = h.checked_sub(*l)?;
            if span >= MAX_ENUM_STEPS + 1 {
                return None;
            }
            let remaining = (span + 1).checked_sub(exclude)?;
            if remaining >= MAX_ENUM_STEPS {
                return None;
            }
            let start = if low_exclude { l + 1 } else { *l };
            Some((0..remaining).map(|i| Datum::Uint(start + i)).collect())
        }
        _ => None,
    }
}
