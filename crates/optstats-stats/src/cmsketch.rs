//! Count-min frequency sketch over encoded keys.
//!
//! `depth` rows of `width` counters. A key hashes to one counter per row via
//! double hashing of its 128-bit xxh3 digest; a point query returns the
//! minimum of those counters, which never underestimates.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CMSketch {
    depth: usize,
    width: usize,
    count: u64,
    table: Vec<Vec<u32>>,
}

fn split_hash(data: &[u8]) -> (u64, u64) {
    let h = xxh3_128(data);
    (h as u64, (h >> 64) as u64)
}

impl CMSketch {
    /// Zero dimensions are raised to 1.
    #[must_use]
    pub fn new(depth: usize, width: usize) -> Self {
        let (depth, width) = (depth.max(1), width.max(1));
        Self {
            depth,
            width,
            count: 0,
            table: vec![vec![0; width]; depth],
        }
    }

    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Total number of insertions.
    #[must_use]
    pub const fn total_count(&self) -> u64 {
        self.count
    }

    fn slot(&self, row: usize, h1: u64, h2: u64) -> usize {
        (h1.wrapping_add(h2.wrapping_mul(row as u64)) % self.width as u64) as usize
    }

    pub fn insert_bytes(&mut self, data: &[u8]) {
        self.insert_bytes_n(data, 1);
    }

    pub fn insert_bytes_n(&mut self, data: &[u8], n: u32) {
        let (h1, h2) = split_hash(data);
        self.count += u64::from(n);
        for row in 0..self.depth {
            let j = self.slot(row, h1, h2);
            self.table[row][j] = self.table[row][j].saturating_add(n);
        }
    }

    /// Approximate occurrences of `data`.
    #[must_use]
    pub fn query_bytes(&self, data: &[u8]) -> u64 {
        let (h1, h2) = split_hash(data);
        (0..self.depth)
            .map(|row| u64::from(self.table[row][self.slot(row, h1, h2)]))
            .min()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn mem_usage(&self) -> i64 {
        (std::mem::size_of::<Self>() + self.depth * self.width * std::mem::size_of::<u32>()) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_underestimates() {
        let mut cms = CMSketch::new(5, 64);
        for i in 0_u32..500 {
            let key = (i % 50).to_be_bytes();
            cms.insert_bytes(&key);
        }
        assert_eq!(cms.total_count(), 500);
        for i in 0_u32..50 {
            assert!(cms.query_bytes(&i.to_be_bytes()) >= 10);
        }
    }

    #[test]
    fn test_exact_without_collisions() {
        let mut cms = CMSketch::new(4, 4096);
        cms.insert_bytes_n(b"hot", 7);
        cms.insert_bytes(b"cold");
        assert_eq!(cms.query_bytes(b"hot"), 7);
        assert_eq!(cms.query_bytes(b"cold"), 1);
        assert_eq!(cms.query_bytes(b"absent"), 0);
    }
}
