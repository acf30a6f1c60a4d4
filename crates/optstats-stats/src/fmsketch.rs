//! Flajolet-Martin style distinct-value sketch.
//!
//! Keeps the hashes whose low bits under `mask` are all zero. Whenever the
//! set outgrows `max_size` the mask widens by one bit and the set is
//! filtered, so the kept hashes are a `1 / (mask + 1)` sample of all
//! distinct hashes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FMSketch {
    mask: u64,
    max_size: usize,
    hashes: HashSet<u64>,
}

impl FMSketch {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            mask: 0,
            max_size,
            hashes: HashSet::with_capacity(max_size + 1),
        }
    }

    pub fn insert_bytes(&mut self, data: &[u8]) {
        self.insert_hash(xxh3_64(data));
    }

    fn insert_hash(&mut self, hash: u64) {
        if hash & self.mask != 0 {
            return;
        }
        self.hashes.insert(hash);
        if self.hashes.len() > self.max_size {
            self.mask = self.mask * 2 + 1;
            let mask = self.mask;
            self.hashes.retain(|h| h & mask == 0);
        }
    }

    /// Estimated number of distinct inserted values.
    #[must_use]
    pub fn ndv(&self) -> i64 {
        ((self.mask + 1) * self.hashes.len() as u64) as i64
    }

    #[must_use]
    pub fn mem_usage(&self) -> i64 {
        (std::mem::size_of::<Self>() + self.hashes.capacity() * (std::mem::size_of::<u64>() + 1)) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_below_capacity() {
        let mut fm = FMSketch::new(1000);
        for i in 0_u64..200 {
            fm.insert_bytes(&(i % 100).to_be_bytes());
        }
        assert_eq!(fm.ndv(), 100);
    }

    #[test]
    fn test_sampled_estimate_is_close() {
        let mut fm = FMSketch::new(256);
        for i in 0_u64..20_000 {
            fm.insert_bytes(&i.to_le_bytes());
        }
        let ndv = fm.ndv() as f64;
        assert!((ndv - 20_000.0).abs() / 20_000.0 < 0.35, "ndv estimate {ndv}");
    }
}
