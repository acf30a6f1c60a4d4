//! Statistics of one index. Histogram bounds and TopN entries are encoded
//! index keys.

use std::fmt;

use optstats_error::Result;
use optstats_types::{Datum, IndexInfo, Range, TableItemId, codec};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::cmsketch::CMSketch;
use crate::context::StatsContext;
use crate::estimate::{VERSION1, VERSION2, out_of_range_eq_selectivity};
use crate::fmsketch::FMSketch;
use crate::histogram::Histogram;
use crate::load_status::{EvictLevel, StatsLoadedStatus};
use crate::memory::ItemMemUsage;
use crate::topn::TopN;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub physical_id: i64,
    pub info: IndexInfo,
    pub histogram: Histogram,
    pub cm_sketch: Option<CMSketch>,
    pub top_n: Option<TopN>,
    pub fm_sketch: Option<FMSketch>,
    pub stats_ver: i64,
    pub loaded: StatsLoadedStatus,
}

impl Index {
    #[must_use]
    pub fn new(physical_id: i64, info: IndexInfo, histogram: Histogram) -> Self {
        Self {
            physical_id,
            info,
            histogram,
            cm_sketch: None,
            top_n: None,
            fm_sketch: None,
            stats_ver: VERSION2,
            loaded: StatsLoadedStatus::full_load(),
        }
    }

    #[must_use]
    pub fn with_top_n(mut self, top_n: TopN) -> Self {
        self.top_n = Some(top_n);
        self
    }

    #[must_use]
    pub fn with_cm_sketch(mut self, cms: CMSketch) -> Self {
        self.cm_sketch = Some(cms);
        self
    }

    #[must_use]
    pub fn with_fm_sketch(mut self, fms: FMSketch) -> Self {
        self.fm_sketch = Some(fms);
        self
    }

    #[must_use]
    pub const fn with_stats_ver(mut self, ver: i64) -> Self {
        self.stats_ver = ver;
        self
    }

    #[must_use]
    pub const fn with_loaded(mut self, loaded: StatsLoadedStatus) -> Self {
        self.loaded = loaded;
        self
    }

    #[must_use]
    pub const fn id(&self) -> i64 {
        self.info.id
    }

    #[must_use]
    pub const fn is_analyzed(&self) -> bool {
        self.stats_ver != crate::estimate::VERSION0
    }

    fn is_single_column(&self) -> bool {
        self.info.columns.len() == 1
    }

    fn top_n_count(&self) -> f64 {
        self.top_n.as_ref().map_or(0, TopN::total_count) as f64
    }

    #[must_use]
    pub fn total_row_count(&self) -> f64 {
        if self.stats_ver >= VERSION2 {
            return self.histogram.total_row_count() + self.top_n_count();
        }
        self.histogram.total_row_count()
    }

    #[must_use]
    pub fn increase_factor(&self, realtime_row_count: i64) -> f64 {
        let index_count = self.total_row_count();
        if index_count == 0.0 {
            return 1.0;
        }
        realtime_row_count as f64 / index_count
    }

    /// Whether estimation must fall back to pseudo statistics. Partially
    /// loaded statistics are queued for background loading.
    pub fn is_invalid(&self, ctx: &StatsContext, coll_pseudo: bool) -> bool {
        let _scope = ctx.trace_scope("Index.IsInvalid");
        if self.loaded.is_load_needed() {
            if ctx.config().sync_load_enabled() {
                warn!(
                    table_id = self.physical_id,
                    index_id = self.info.id,
                    index = %self.info.name,
                    status = self.loaded.status_to_string(),
                    "index histogram should already be loaded synchronously but is not"
                );
            }
            ctx.needed_items()
                .insert(TableItemId::index(self.physical_id, self.info.id));
        }
        let total = self.total_row_count();
        let invalid = coll_pseudo || !self.loaded.is_essential_stats_loaded() || total == 0.0;
        ctx.trace_values([
            ("IsInvalid", json!(invalid)),
            ("CollPseudo", json!(coll_pseudo)),
            ("TotalCount", json!(total)),
        ]);
        invalid
    }

    /// Whether the encoded key lies outside both the TopN and the histogram.
    /// A bound that starts with `encoded` counts as inside, so a prefix of
    /// the index columns is in range when some full key extends it.
    #[must_use]
    pub fn out_of_range(&self, encoded: &[u8]) -> bool {
        let out_of_top_n = self.top_n.as_ref().is_none_or(|t| t.out_of_range(encoded));
        if !out_of_top_n {
            return false;
        }
        let bounds = self.histogram.bounds();
        let (Some(first), Some(last)) = (
            bounds.first().and_then(Datum::as_bytes),
            bounds.last().and_then(Datum::as_bytes),
        ) else {
            return true;
        };
        let within_low = first <= encoded || first.starts_with(encoded);
        let within_high = last >= encoded || last.starts_with(encoded);
        !within_low || !within_high
    }

    /// Point count of an encoded key: TopN, then the frequency sketch, then
    /// the histogram.
    #[must_use]
    pub fn query_bytes(&self, encoded: &[u8]) -> u64 {
        if let Some(count) = self.top_n.as_ref().and_then(|t| t.query(encoded)) {
            return count;
        }
        if let Some(cms) = &self.cm_sketch {
            return cms.query_bytes(encoded);
        }
        let value = Datum::Bytes(encoded.to_vec());
        self.histogram
            .equal_row_count(&value, self.stats_ver >= VERSION2)
            .0 as u64
    }

    /// Rows whose full key equals `encoded`.
    #[must_use]
    pub fn equal_row_count(&self, ctx: &StatsContext, encoded: &[u8], realtime_row_count: i64) -> f64 {
        if self.is_single_column() && encoded == codec::NULL_KEY {
            return self.histogram.null_count as f64;
        }
        if self.stats_ver < VERSION2 {
            if self.histogram.ndv > 0 && self.out_of_range(encoded) {
                let total = self.total_row_count();
                return out_of_range_eq_selectivity(
                    Some(ctx),
                    self.histogram.ndv,
                    realtime_row_count,
                    total as i64,
                ) * total;
            }
            if self.cm_sketch.is_some() {
                return self.query_bytes(encoded) as f64;
            }
            let value = Datum::Bytes(encoded.to_vec());
            return self.histogram.equal_row_count(&value, false).0;
        }
        if let Some(count) = self.top_n.as_ref().and_then(|t| t.query(encoded)) {
            return count as f64;
        }
        let value = Datum::Bytes(encoded.to_vec());
        let (hist_count, matched) = self.histogram.equal_row_count(&value, true);
        if matched {
            return hist_count;
        }
        let top_n_num = self.top_n.as_ref().map_or(0, TopN::num) as i64;
        let hist_ndv = (self.histogram.ndv - top_n_num) as f64;
        if hist_ndv <= 0.0 {
            return 0.0;
        }
        self.histogram.not_null_count() / hist_ndv
    }

    /// Rows with keys in `[low, high)`, TopN included unless version 1.
    #[must_use]
    pub fn between_row_count(&self, low: &[u8], high: &[u8]) -> f64 {
        let hist = self
            .histogram
            .between_row_count(&Datum::Bytes(low.to_vec()), &Datum::Bytes(high.to_vec()));
        if self.stats_ver == VERSION1 {
            return hist;
        }
        let top_n = self.top_n.as_ref().map_or(0, |t| t.between_count(low, high));
        top_n as f64 + hist
    }

    /// Rows matching any of the index `ranges`, capped at
    /// `realtime_row_count`.
    ///
    /// # Errors
    ///
    /// Fails when a bound cannot be encoded.
    pub fn row_count(&self, ctx: &StatsContext, ranges: &[Range], realtime_row_count: i64) -> Result<f64> {
        let column_len = self.info.columns.len();
        let mut total = 0.0;
        for rg in ranges {
            let mut lb = codec::encode_key_to_vec(&rg.low)?;
            let mut rb = codec::encode_key_to_vec(&rg.high)?;
            let full_len = rg.low.len() == rg.high.len() && rg.low.len() == column_len;
            if lb == rb {
                if rg.low_exclude || rg.high_exclude {
                    continue;
                }
                if full_len {
                    // At most one row.
                    if self.info.unique {
                        total += 1.0;
                        continue;
                    }
                    let count = self.equal_row_count(ctx, &lb, realtime_row_count);
                    total += count * self.increase_factor(realtime_row_count);
                    continue;
                }
            }
            // Turn the range into [lb, rb).
            if rg.low_exclude {
                lb = codec::prefix_next(&lb);
            }
            if !rg.high_exclude {
                rb = codec::prefix_next(&rb);
            }
            if self.is_single_column() && lb == codec::NULL_KEY {
                total += self.histogram.null_count as f64;
            }
            total += self.between_row_count(&lb, &rb);
        }
        Ok(total.max(0.0).min(realtime_row_count as f64))
    }

    #[must_use]
    pub fn memory_usage(&self) -> ItemMemUsage {
        ItemMemUsage::new(
            self.info.id,
            self.histogram.mem_usage(),
            self.cm_sketch.as_ref().map_or(0, CMSketch::mem_usage),
            self.fm_sketch.as_ref().map_or(0, FMSketch::mem_usage),
            self.top_n.as_ref().map_or(0, TopN::mem_usage),
        )
    }

    pub fn drop_unnecessary_data(&mut self) {
        if self.stats_ver < VERSION2 {
            self.cm_sketch = None;
        }
        self.top_n = None;
        self.histogram.clear_buckets();
        self.loaded.set_evicted(EvictLevel::AllEvicted);
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.histogram.to_display_string(true))?;
        if let Some(top_n) = &self.top_n {
            write!(f, "\n{top_n}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optstats_types::{FieldType, IndexColumn};

    fn key(values: &[Datum]) -> Vec<u8> {
        codec::encode_key_to_vec(values).unwrap()
    }

    fn kd(values: &[i64]) -> Datum {
        let values: Vec<Datum> = values.iter().copied().map(Datum::Int).collect();
        Datum::Bytes(key(&values))
    }

    /// Index on (a, b): `[(1,1), (1,5)] x10` and `[(2,1), (3,3)] x20`.
    fn ab_index() -> Index {
        let info = IndexInfo::new(1, "idx_ab", vec![IndexColumn::new("a", 0), IndexColumn::new("b", 1)]);
        let mut h = Histogram::new(1, 12, 0, 1, FieldType::blob(), 2, 0);
        h.append_bucket_with_ndv(kd(&[1, 1]), kd(&[1, 5]), 10, 2, 5);
        h.append_bucket_with_ndv(kd(&[2, 1]), kd(&[3, 3]), 30, 4, 7);
        Index::new(100, info, h)
    }

    #[test]
    fn test_out_of_range_matches_prefixes() {
        let idx = ab_index();
        assert!(!idx.out_of_range(&key(&[Datum::Int(1)])));
        assert!(!idx.out_of_range(&key(&[Datum::Int(3)])));
        assert!(!idx.out_of_range(&key(&[Datum::Int(2), Datum::Int(9)])));
        assert!(idx.out_of_range(&key(&[Datum::Int(0)])));
        assert!(idx.out_of_range(&key(&[Datum::Int(5)])));
    }

    #[test]
    fn test_prefix_point_counts_its_buckets() {
        let ctx = StatsContext::default();
        let idx = ab_index();
        let rows = idx.row_count(&ctx, &[Range::point([Datum::Int(1)])], 30).unwrap();
        assert_eq!(rows, 10.0);
    }

    #[test]
    fn test_full_point() {
        let ctx = StatsContext::default();
        let idx = ab_index();
        let point = Range::point([Datum::Int(1), Datum::Int(5)]);
        assert_eq!(idx.row_count(&ctx, &[point.clone()], 30).unwrap(), 2.0);

        let mut unique = ab_index();
        unique.info.unique = true;
        assert_eq!(unique.row_count(&ctx, &[point], 30).unwrap(), 1.0);

        // An excluded point selects nothing.
        let mut empty = Range::point([Datum::Int(1), Datum::Int(5)]);
        empty.low_exclude = true;
        assert_eq!(idx.row_count(&ctx, &[empty], 30).unwrap(), 0.0);
    }

    #[test]
    fn test_equal_row_count_spreads_bucket_rows() {
        let ctx = StatsContext::default();
        let inside = key(&[Datum::Int(2), Datum::Int(2)]);
        // 16 non-repeat rows of the second bucket over its 6 other values.
        let got = ab_index().equal_row_count(&ctx, &inside, 30);
        assert!((got - 16.0 / 6.0).abs() < 1e-9, "{got}");
        // Version 1 ignores bucket NDV: 30 rows over 12 values.
        let v1 = ab_index().with_stats_ver(VERSION1);
        assert_eq!(v1.equal_row_count(&ctx, &inside, 30), 2.5);
        assert_eq!(ab_index().equal_row_count(&ctx, &key(&[Datum::Int(3), Datum::Int(3)]), 30), 4.0);
    }

    #[test]
    fn test_single_column_null_key() {
        let ctx = StatsContext::default();
        let info = IndexInfo::new(2, "idx_a", vec![IndexColumn::new("a", 0)]);
        let mut h = Histogram::new(2, 2, 7, 1, FieldType::blob(), 1, 0);
        h.append_bucket(kd(&[1]), kd(&[2]), 10, 5);
        let idx = Index::new(100, info, h);
        assert_eq!(idx.equal_row_count(&ctx, &codec::NULL_KEY, 17), 7.0);
        let null_range = Range::point([Datum::Null]);
        assert_eq!(idx.row_count(&ctx, &[null_range], 17).unwrap(), 7.0);
        let all = Range::new([Datum::Null], [Datum::MaxValue], false, false);
        assert_eq!(idx.row_count(&ctx, &[all], 17).unwrap(), 17.0);
    }

    #[test]
    fn test_query_bytes_prefers_top_n() {
        let mut idx = ab_index().with_top_n(TopN::from_values([(Datum::Int(9), 4)]).unwrap());
        let nine = key(&[Datum::Int(9)]);
        assert_eq!(idx.query_bytes(&nine), 4);
        assert!(!idx.out_of_range(&nine));
        idx.drop_unnecessary_data();
        assert!(idx.loaded.is_all_evicted());
        assert_eq!(idx.query_bytes(&nine), 0);
    }
}
