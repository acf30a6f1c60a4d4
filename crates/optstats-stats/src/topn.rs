//! Most-frequent-value lists.

use std::fmt;

use optstats_error::Result;
use optstats_types::{Datum, codec};
use serde::{Deserialize, Serialize};

/// One frequent value and its exact row count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopNMeta {
    pub encoded: Vec<u8>,
    pub count: u64,
}

impl TopNMeta {
    #[must_use]
    pub fn new(encoded: Vec<u8>, count: u64) -> Self {
        Self { encoded, count }
    }
}

/// Frequent values sorted by encoded key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopN {
    items: Vec<TopNMeta>,
}

impl TopN {
    /// Build from entries in any order.
    #[must_use]
    pub fn new(mut items: Vec<TopNMeta>) -> Self {
        items.sort_by(|a, b| a.encoded.cmp(&b.encoded));
        Self { items }
    }

    /// Build from `(value, count)` pairs, encoding each value as a key.
    ///
    /// # Errors
    ///
    /// Fails when a value cannot be encoded.
    pub fn from_values(pairs: impl IntoIterator<Item = (Datum, u64)>) -> Result<Self> {
        let items = pairs
            .into_iter()
            .map(|(value, count)| Ok(TopNMeta::new(codec::encode_key_to_vec(&[value])?, count)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(items))
    }

    #[must_use]
    pub fn items(&self) -> &[TopNMeta] {
        &self.items
    }

    #[must_use]
    pub fn num(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.items.iter().map(|m| m.count).sum()
    }

    /// Index of the first entry not below `encoded`, and whether it is equal.
    #[must_use]
    pub fn lower_bound(&self, encoded: &[u8]) -> (usize, bool) {
        let idx = self
            .items
            .partition_point(|m| m.encoded.as_slice() < encoded);
        let matched = self
            .items
            .get(idx)
            .is_some_and(|m| m.encoded.as_slice() == encoded);
        (idx, matched)
    }

    /// Exact count of `encoded`, if it is a frequent value.
    #[must_use]
    pub fn query(&self, encoded: &[u8]) -> Option<u64> {
        match self.lower_bound(encoded) {
            (idx, true) => Some(self.items[idx].count),
            _ => None,
        }
    }

    /// Rows of frequent values in `[low, high)`.
    #[must_use]
    pub fn between_count(&self, low: &[u8], high: &[u8]) -> u64 {
        let (l, _) = self.lower_bound(low);
        let (r, _) = self.lower_bound(high);
        if r <= l {
            return 0;
        }
        self.items[l..r].iter().map(|m| m.count).sum()
    }

    /// Whether `encoded` lies outside the first and last entries. A bound
    /// that starts with `encoded` counts as inside, so index prefixes match.
    #[must_use]
    pub fn out_of_range(&self, encoded: &[u8]) -> bool {
        let (Some(first), Some(last)) = (self.items.first(), self.items.last()) else {
            return true;
        };
        let within_low = first.encoded.as_slice() <= encoded || first.encoded.starts_with(encoded);
        let within_high = last.encoded.as_slice() >= encoded || last.encoded.starts_with(encoded);
        !within_low || !within_high
    }

    /// Decode every entry's first value, in key order.
    ///
    /// # Errors
    ///
    /// Fails on a malformed key.
    pub fn decoded_values(&self) -> Result<Vec<Datum>> {
        self.items
            .iter()
            .map(|m| codec::decode_one(&m.encoded).map(|(value, _)| value))
            .collect()
    }

    #[must_use]
    pub fn mem_usage(&self) -> i64 {
        let items: usize = self
            .items
            .iter()
            .map(|m| std::mem::size_of::<TopNMeta>() + m.encoded.capacity())
            .sum();
        (std::mem::size_of::<Self>() + items) as i64
    }
}

impl fmt::Display for TopN {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TopN{")?;
        for (i, m) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match codec::decode_all(&m.encoded) {
                Ok(values) if values.len() == 1 => write!(f, "({}, {})", values[0], m.count)?,
                Ok(values) => {
                    let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                    write!(f, "(({}), {})", parts.join(", "), m.count)?;
                }
                Err(_) => write!(f, "({:?}, {})", m.encoded, m.count)?,
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: i64) -> Vec<u8> {
        codec::encode_key_to_vec(&[Datum::Int(v)]).unwrap()
    }

    fn sample() -> TopN {
        TopN::from_values([(Datum::Int(30), 3), (Datum::Int(10), 1), (Datum::Int(20), 2)]).unwrap()
    }

    #[test]
    fn test_query_and_total() {
        let t = sample();
        assert_eq!(t.total_count(), 6);
        assert_eq!(t.query(&key(20)), Some(2));
        assert_eq!(t.query(&key(25)), None);
        assert_eq!(t.decoded_values().unwrap(), vec![Datum::Int(10), Datum::Int(20), Datum::Int(30)]);
    }

    #[test]
    fn test_between_count_is_half_open() {
        let t = sample();
        assert_eq!(t.between_count(&key(10), &key(30)), 3);
        assert_eq!(t.between_count(&key(11), &key(31)), 5);
        assert_eq!(t.between_count(&key(30), &key(10)), 0);
    }

    #[test]
    fn test_out_of_range() {
        let t = sample();
        assert!(!t.out_of_range(&key(15)));
        assert!(t.out_of_range(&key(31)));
        assert!(TopN::default().out_of_range(&key(1)));
        // A prefix of the last entry is not out of range.
        let last = key(30);
        assert!(!t.out_of_range(&last[..3]));
    }

    #[test]
    fn test_display() {
        assert_eq!(sample().to_string(), "TopN{(10, 1), (20, 2), (30, 3)}");
    }
}
