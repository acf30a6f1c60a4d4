//! Equi-depth histograms.
//!
//! Bounds are stored interleaved, `[lower0, upper0, lower1, upper1, ...]`, so
//! a single binary search over the bound table locates a value both between
//! and inside buckets: an even hit is a lower bound, an odd hit an upper
//! bound. Bucket counts are cumulative.
//!
//! # Estimation
//! - Less-than: whole buckets below the value plus linear interpolation
//!   inside the bucket that contains it, excluding the upper bound's repeats.
//! - Equality: the repeat count on an upper-bound hit, otherwise the bucket's
//!   average per distinct value.
//! - Between: `less(b) - less(a)`, with an NDV-based fallback when the
//!   interpolation collapses.

use std::cmp::Ordering;
use std::fmt;

use optstats_types::codec;
use optstats_types::{Datum, FieldType};
use serde::{Deserialize, Serialize};

/// One histogram bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bucket {
    /// Rows in this and all previous buckets.
    pub count: i64,
    /// Rows equal to the upper bound.
    pub repeat: i64,
    /// Distinct values in the bucket, 0 when not collected.
    pub ndv: i64,
}

/// Where a value falls relative to the buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLocation {
    /// The value is above the last upper bound.
    pub exceed: bool,
    pub bucket_idx: usize,
    /// The value lies within `[lower, upper]` of `bucket_idx`.
    pub in_bucket: bool,
    /// The value equals the bucket's upper bound.
    pub match_last_value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub id: i64,
    pub ndv: i64,
    pub null_count: i64,
    pub last_update_version: u64,
    pub tp: FieldType,
    /// Sum of the encoded sizes of all values, used for average width.
    pub tot_col_size: i64,
    pub correlation: f64,
    bounds: Vec<Datum>,
    buckets: Vec<Bucket>,
}

impl Histogram {
    #[must_use]
    pub fn new(
        id: i64,
        ndv: i64,
        null_count: i64,
        version: u64,
        tp: FieldType,
        bucket_cap: usize,
        tot_col_size: i64,
    ) -> Self {
        Self {
            id,
            ndv,
            null_count,
            last_update_version: version,
            tp,
            tot_col_size,
            correlation: 0.0,
            bounds: Vec::with_capacity(bucket_cap * 2),
            buckets: Vec::with_capacity(bucket_cap),
        }
    }

    /// Append a bucket. `count` is cumulative.
    pub fn append_bucket(&mut self, lower: Datum, upper: Datum, count: i64, repeat: i64) {
        self.append_bucket_with_ndv(lower, upper, count, repeat, 0);
    }

    pub fn append_bucket_with_ndv(
        &mut self,
        lower: Datum,
        upper: Datum,
        count: i64,
        repeat: i64,
        ndv: i64,
    ) {
        self.bounds.push(lower);
        self.bounds.push(upper);
        self.buckets.push(Bucket { count, repeat, ndv });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    #[must_use]
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// The interleaved bound table.
    #[must_use]
    pub fn bounds(&self) -> &[Datum] {
        &self.bounds
    }

    #[must_use]
    pub fn lower_bound(&self, idx: usize) -> &Datum {
        &self.bounds[2 * idx]
    }

    #[must_use]
    pub fn upper_bound(&self, idx: usize) -> &Datum {
        &self.bounds[2 * idx + 1]
    }

    /// Drop every bucket, keeping the scalar metadata.
    pub fn clear_buckets(&mut self) {
        self.bounds = Vec::new();
        self.buckets = Vec::new();
    }

    #[must_use]
    pub fn not_null_count(&self) -> f64 {
        self.buckets.last().map_or(0.0, |b| b.count as f64)
    }

    #[must_use]
    pub fn total_row_count(&self) -> f64 {
        self.not_null_count() + self.null_count as f64
    }

    /// Rows in bucket `idx` alone.
    #[must_use]
    pub fn bucket_count(&self, idx: usize) -> i64 {
        let prev = if idx == 0 { 0 } else { self.buckets[idx - 1].count };
        self.buckets[idx].count - prev
    }

    fn search_bounds(&self, value: &Datum) -> (usize, bool) {
        let idx = self
            .bounds
            .partition_point(|b| b.cmp_total(value) == Ordering::Less);
        let matched = self
            .bounds
            .get(idx)
            .is_some_and(|b| b.cmp_total(value) == Ordering::Equal);
        (idx, matched)
    }

    #[must_use]
    pub fn locate_bucket(&self, value: &Datum) -> BucketLocation {
        let outside = |exceed, bucket_idx| BucketLocation {
            exceed,
            bucket_idx,
            in_bucket: false,
            match_last_value: false,
        };
        if self.bounds.is_empty() {
            return outside(true, 0);
        }
        let (index, matched) = self.search_bounds(value);
        if index >= self.bounds.len() {
            return outside(true, self.len());
        }
        let bucket_idx = index / 2;
        if index == 0 && !matched {
            return outside(false, 0);
        }
        if index % 2 == 1 || matched {
            return BucketLocation {
                exceed: false,
                bucket_idx,
                in_bucket: true,
                match_last_value: matched && index % 2 == 1,
            };
        }
        outside(false, bucket_idx)
    }

    /// Rows strictly less than `value` and the bucket the search ended in.
    #[must_use]
    pub fn less_row_count_with_bucket_idx(&self, value: &Datum) -> (f64, usize) {
        if self.bounds.is_empty() {
            return (0.0, 0);
        }
        let (index, matched) = self.search_bounds(value);
        if index == self.bounds.len() {
            return (self.not_null_count(), self.len() - 1);
        }
        let bucket_idx = index / 2;
        let cur = self.buckets[bucket_idx];
        let (cur_count, cur_repeat) = (cur.count as f64, cur.repeat as f64);
        let pre_count = if bucket_idx > 0 {
            self.buckets[bucket_idx - 1].count as f64
        } else {
            0.0
        };
        if index % 2 == 1 {
            if matched {
                return (cur_count - cur_repeat, bucket_idx);
            }
            let frac = self.calc_fraction(bucket_idx, value);
            return (
                pre_count + frac * (cur_count - cur_repeat - pre_count),
                bucket_idx,
            );
        }
        (pre_count, bucket_idx)
    }

    #[must_use]
    pub fn less_row_count(&self, value: &Datum) -> f64 {
        self.less_row_count_with_bucket_idx(value).0
    }

    /// Rows equal to `value`, and whether the count is specific to it.
    ///
    /// An upper bound hit answers with the bucket's repeats. With
    /// `has_bucket_ndv` any other in-bucket value gets the bucket's non-repeat
    /// rows spread over its other distinct values, which is also specific.
    /// Everything else falls back to the flat per-value average.
    #[must_use]
    pub fn equal_row_count(&self, value: &Datum, has_bucket_ndv: bool) -> (f64, bool) {
        let loc = self.locate_bucket(value);
        if !loc.in_bucket {
            return (0.0, false);
        }
        let bucket = self.buckets[loc.bucket_idx];
        if loc.match_last_value {
            return (bucket.repeat as f64, true);
        }
        if has_bucket_ndv && bucket.ndv > 1 {
            let non_repeat = (self.bucket_count(loc.bucket_idx) - bucket.repeat) as f64;
            return (non_repeat / (bucket.ndv - 1) as f64, true);
        }
        if self.ndv <= 0 {
            return (0.0, false);
        }
        (self.not_null_count() / self.ndv as f64, false)
    }

    #[must_use]
    pub fn greater_row_count(&self, value: &Datum) -> f64 {
        let gt = self.not_null_count() - self.less_row_count(value) - self.equal_row_count(value, false).0;
        gt.max(0.0)
    }

    /// Rows in `[a, b)`.
    #[must_use]
    pub fn between_row_count(&self, a: &Datum, b: &Datum) -> f64 {
        let less_a = self.less_row_count(a);
        let less_b = self.less_row_count(b);
        // The interpolation cannot separate a and b; assume at most one value.
        if less_a >= less_b && self.ndv > 0 {
            return less_b.min(self.not_null_count() / self.ndv as f64);
        }
        less_b - less_a
    }

    /// Whether `value` is outside `[first lower, last upper]`.
    #[must_use]
    pub fn out_of_range(&self, value: &Datum) -> bool {
        match (self.bounds.first(), self.bounds.last()) {
            (Some(first), Some(last)) => {
                first.cmp_total(value) == Ordering::Greater || last.cmp_total(value) == Ordering::Less
            }
            _ => false,
        }
    }

    /// Position of `value` between the bounds of bucket `idx`, in `[0, 1]`.
    #[must_use]
    pub fn calc_fraction(&self, idx: usize, value: &Datum) -> f64 {
        interpolate_position(self.lower_bound(idx), self.upper_bound(idx), value)
    }

    #[must_use]
    pub fn mem_usage(&self) -> i64 {
        let bounds: usize = self.bounds.iter().map(Datum::mem_usage).sum();
        let buckets = self.buckets.capacity() * std::mem::size_of::<Bucket>();
        (std::mem::size_of::<Self>() + bounds + buckets) as i64
    }

    /// Multi-line dump. Index bounds are encoded keys and are decoded first.
    #[must_use]
    pub fn to_display_string(&self, is_index: bool) -> String {
        let mut out = if is_index {
            format!("index:{} ndv:{}", self.id, self.ndv)
        } else {
            format!("column:{} ndv:{} totColSize:{}", self.id, self.ndv, self.tot_col_size)
        };
        for (i, bucket) in self.buckets.iter().enumerate() {
            let (lower, upper) = if is_index {
                (decoded_display(self.lower_bound(i)), decoded_display(self.upper_bound(i)))
            } else {
                (self.lower_bound(i).to_string(), self.upper_bound(i).to_string())
            };
            out.push_str(&format!(
                "\nnum: {} lower_bound: {} upper_bound: {} repeats: {} ndv: {}",
                self.bucket_count(i),
                lower,
                upper,
                bucket.repeat,
                bucket.ndv
            ));
        }
        out
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string(false))
    }
}

fn decoded_display(bound: &Datum) -> String {
    let Some(key) = bound.as_bytes() else {
        return bound.to_string();
    };
    match codec::decode_all(key) {
        Ok(values) => {
            let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
            format!("({})", parts.join(", "))
        }
        Err(_) => bound.to_string(),
    }
}

/// Linear interpolation of `val` between `min` and `max`, in `[0, 1]`.
///
/// Numbers interpolate on their value. Strings and bytes interpolate on the
/// first eight bytes after the common prefix of the bounds. Anything else is
/// assumed to sit in the middle.
fn interpolate_position(min: &Datum, max: &Datum, val: &Datum) -> f64 {
    let Some((lo, hi, v)) = scalars(min, max, val) else {
        return 0.5;
    };
    if hi <= lo {
        return 0.5;
    }
    ((v - lo) / (hi - lo)).clamp(0.0, 1.0)
}

fn numeric(d: &Datum) -> Option<f64> {
    match d {
        Datum::Int(v) => Some(*v as f64),
        Datum::Uint(v) => Some(*v as f64),
        Datum::Float(v) => Some(*v),
        _ => None,
    }
}

fn scalars(min: &Datum, max: &Datum, val: &Datum) -> Option<(f64, f64, f64)> {
    if let (Some(lo), Some(hi), Some(v)) = (numeric(min), numeric(max), numeric(val)) {
        return Some((lo, hi, v));
    }
    let (lo, hi, v) = (min.as_bytes()?, max.as_bytes()?, val.as_bytes()?);
    let prefix = lo.iter().zip(hi).take_while(|(a, b)| a == b).count();
    Some((
        bytes_to_scalar(lo, prefix),
        bytes_to_scalar(hi, prefix),
        bytes_to_scalar(v, prefix),
    ))
}

fn bytes_to_scalar(value: &[u8], prefix: usize) -> f64 {
    let mut buf = [0_u8; 8];
    if let Some(rest) = value.get(prefix..) {
        let n = rest.len().min(8);
        buf[..n].copy_from_slice(&rest[..n]);
    }
    u64::from_be_bytes(buf) as f64
}
