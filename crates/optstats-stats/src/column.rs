//! Statistics of one column.

use std::cmp::Ordering;
use std::fmt;

use optstats_error::Result;
use optstats_types::{Collation, ColumnInfo, Datum, FieldKind, Range, TableItemId, codec, enum_range_values};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::cmsketch::CMSketch;
use crate::context::StatsContext;
use crate::estimate::{VERSION0, VERSION2, out_of_range_eq_selectivity};
use crate::fmsketch::FMSketch;
use crate::histogram::Histogram;
use crate::load_status::{EvictLevel, StatsLoadedStatus};
use crate::memory::ItemMemUsage;
use crate::topn::TopN;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub physical_id: i64,
    pub info: ColumnInfo,
    pub histogram: Histogram,
    pub cm_sketch: Option<CMSketch>,
    pub top_n: Option<TopN>,
    pub fm_sketch: Option<FMSketch>,
    pub stats_ver: i64,
    /// The column is the integer row handle.
    pub is_handle: bool,
    pub loaded: StatsLoadedStatus,
}

impl Column {
    /// Fully loaded version-2 statistics with only a histogram.
    #[must_use]
    pub fn new(physical_id: i64, info: ColumnInfo, histogram: Histogram) -> Self {
        Self {
            physical_id,
            info,
            histogram,
            cm_sketch: None,
            top_n: None,
            fm_sketch: None,
            stats_ver: VERSION2,
            is_handle: false,
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
    pub const fn with_handle(mut self) -> Self {
        self.is_handle = true;
        self
    }

    #[must_use]
    pub const fn id(&self) -> i64 {
        self.info.id
    }

    #[must_use]
    pub const fn is_analyzed(&self) -> bool {
        self.stats_ver != VERSION0
    }

    fn top_n_count(&self) -> f64 {
        self.top_n.as_ref().map_or(0, TopN::total_count) as f64
    }

    fn top_n_num(&self) -> i64 {
        self.top_n.as_ref().map_or(0, TopN::num) as i64
    }

    /// Rows seen at analyze time, NULLs included.
    #[must_use]
    pub fn total_row_count(&self) -> f64 {
        if self.stats_ver >= VERSION2 {
            return self.histogram.total_row_count() + self.top_n_count();
        }
        self.histogram.total_row_count()
    }

    #[must_use]
    pub fn not_null_count(&self) -> f64 {
        if self.stats_ver >= VERSION2 {
            return self.histogram.not_null_count() + self.top_n_count();
        }
        self.histogram.not_null_count()
    }

    /// Growth of the table since analyze, 1 when nothing was analyzed.
    #[must_use]
    pub fn increase_factor(&self, realtime_row_count: i64) -> f64 {
        let column_count = self.total_row_count();
        if column_count == 0.0 {
            return 1.0;
        }
        realtime_row_count as f64 / column_count
    }

    /// Whether estimation must fall back to pseudo statistics. Partially
    /// loaded statistics are queued for background loading.
    pub fn is_invalid(&self, ctx: &StatsContext, coll_pseudo: bool) -> bool {
        let _scope = ctx.trace_scope("Column.IsInvalid");
        if self.loaded.is_load_needed() {
            if ctx.config().sync_load_enabled() {
                warn!(
                    table_id = self.physical_id,
                    column_id = self.info.id,
                    column = %self.info.name,
                    status = self.loaded.status_to_string(),
                    "histogram should already be loaded synchronously but is not"
                );
            }
            ctx.needed_items()
                .insert(TableItemId::column(self.physical_id, self.info.id));
        }
        let total = self.total_row_count();
        let essential_loaded = self.loaded.is_essential_stats_loaded();
        let invalid = coll_pseudo || !essential_loaded || total == 0.0;
        ctx.trace_values([
            ("IsInvalid", json!(invalid)),
            ("CollPseudo", json!(coll_pseudo)),
            ("TotalCount", json!(total)),
            ("EssentialLoaded", json!(essential_loaded)),
            ("NDV", json!(self.histogram.ndv)),
        ]);
        invalid
    }

    /// Whether `value` falls outside the histogram.
    #[must_use]
    pub fn out_of_range(&self, value: &Datum) -> bool {
        self.histogram.out_of_range(value)
    }

    /// Rows equal to `value`; `encoded` is its key encoding.
    ///
    /// Version 1 extrapolates out-of-range values and otherwise trusts the
    /// frequency sketch. Version 2 consults TopN, then the bucket repeats,
    /// then spreads the remaining rows evenly over the remaining values.
    #[must_use]
    pub fn equal_row_count(
        &self,
        ctx: &StatsContext,
        value: &Datum,
        encoded: &[u8],
        realtime_row_count: i64,
    ) -> f64 {
        if value.is_null() {
            return self.histogram.null_count as f64;
        }
        if self.stats_ver < VERSION2 {
            // Every value is NULL.
            if self.histogram.bounds().is_empty() {
                return 0.0;
            }
            if self.histogram.ndv > 0 && self.out_of_range(value) {
                let total = self.total_row_count();
                return out_of_range_eq_selectivity(
                    Some(ctx),
                    self.histogram.ndv,
                    realtime_row_count,
                    total as i64,
                ) * total;
            }
            if let Some(cms) = &self.cm_sketch {
                if let Some(count) = self.top_n.as_ref().and_then(|t| t.query(encoded)) {
                    return count as f64;
                }
                return cms.query_bytes(encoded) as f64;
            }
            return self.histogram.equal_row_count(value, false).0;
        }
        if self.histogram.bounds().is_empty() && self.top_n_num() == 0 {
            return 0.0;
        }
        if let Some(count) = self.top_n.as_ref().and_then(|t| t.query(encoded)) {
            return count as f64;
        }
        let (hist_count, matched) = self.histogram.equal_row_count(value, true);
        if matched {
            return hist_count;
        }
        let hist_ndv = (self.histogram.ndv - self.top_n_num()) as f64;
        if hist_ndv <= 0.0 {
            return 0.0;
        }
        self.histogram.not_null_count() / hist_ndv
    }

    #[must_use]
    pub fn less_row_count(&self, value: &Datum) -> f64 {
        self.histogram.less_row_count(value)
    }

    #[must_use]
    pub fn greater_row_count(&self, value: &Datum) -> f64 {
        self.histogram.greater_row_count(value)
    }

    /// Rows in `[low, high)`, TopN included from version 2.
    #[must_use]
    pub fn between_row_count(&self, low: &Datum, high: &Datum, low_encoded: &[u8], high_encoded: &[u8]) -> f64 {
        let hist = self.histogram.between_row_count(low, high);
        if self.stats_ver < VERSION2 {
            return hist;
        }
        let top_n = self
            .top_n
            .as_ref()
            .map_or(0, |t| t.between_count(low_encoded, high_encoded));
        top_n as f64 + hist
    }

    /// Rows matching any of the single-column `ranges`, scaled by the
    /// increase factor and capped at `realtime_row_count`.
    ///
    /// # Errors
    ///
    /// Fails when a bound cannot be compared or encoded.
    pub fn column_row_count(
        &self,
        ctx: &StatsContext,
        ranges: &[Range],
        realtime_row_count: i64,
        pk_is_handle: bool,
    ) -> Result<f64> {
        let factor = self.increase_factor(realtime_row_count);
        let mut row_count = 0.0;
        for rg in ranges {
            let collation = rg.collator(0);
            let low = collation_key(&rg.low[0], collation);
            let high = collation_key(&rg.high[0], collation);
            let cmp = low.compare(&high, Collation::Binary)?;
            let low_encoded = codec::encode_key_to_vec(std::slice::from_ref(&low))?;
            let high_encoded = codec::encode_key_to_vec(std::slice::from_ref(&high))?;
            if cmp == Ordering::Equal {
                if !rg.low_exclude && !rg.high_exclude {
                    if pk_is_handle {
                        row_count += 1.0;
                        continue;
                    }
                    let cnt = self.equal_row_count(ctx, &low, &low_encoded, realtime_row_count);
                    row_count += cnt * factor;
                }
                continue;
            }
            // Version 1 answers points from the frequency sketch, which beats
            // interpolation, so short integer ranges become point lists.
            if self.stats_ver < VERSION2 {
                if let Some(values) = enum_range_values(&low, &high, rg.low_exclude, rg.high_exclude) {
                    for value in &values {
                        let encoded = codec::encode_key_to_vec(std::slice::from_ref(value))?;
                        row_count += self.equal_row_count(ctx, value, &encoded, realtime_row_count) * factor;
                    }
                    continue;
                }
            }
            // between_row_count covers [low, high) without NULLs; fix up the
            // bounds. Sentinels stand for open ends and are never counted.
            let mut cnt = self.between_row_count(&low, &high, &low_encoded, &high_encoded);
            if rg.low_exclude && !low.is_null() && !low.is_sentinel() {
                cnt -= self.equal_row_count(ctx, &low, &low_encoded, realtime_row_count);
                cnt = cnt.max(0.0).min(self.not_null_count());
            }
            if !rg.low_exclude && low.is_null() {
                cnt += self.histogram.null_count as f64;
            }
            if !rg.high_exclude && !high.is_sentinel() {
                cnt += self.equal_row_count(ctx, &high, &high_encoded, realtime_row_count);
            }
            cnt = cnt.max(0.0).min(self.total_row_count());
            row_count += cnt * factor;
        }
        Ok(row_count.max(0.0).min(realtime_row_count as f64))
    }

    /// Average width of the column in the row or key format.
    #[must_use]
    pub fn avg_col_size(&self, count: i64, is_key: bool) -> f64 {
        if count == 0 {
            return 0.0;
        }
        // Handles are 8-byte integers, even when stored varint-encoded.
        if self.is_handle {
            return 8.0;
        }
        let ratio = self.not_null_ratio();
        match self.histogram.tp.kind {
            FieldKind::Float | FieldKind::Double | FieldKind::Datetime => return 8.0 * ratio,
            FieldKind::TinyInt | FieldKind::Int | FieldKind::BigInt if is_key => return 8.0 * ratio,
            _ => {}
        }
        round2(self.histogram.tot_col_size as f64 / count as f64)
    }

    /// Average width in the columnar chunk format: fixed width, or the
    /// average payload plus an 8-byte offset.
    #[must_use]
    pub fn avg_col_size_chunk_format(&self, count: i64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        if let Some(len) = self.histogram.tp.fixed_len() {
            return len as f64;
        }
        let avg = self.histogram.tot_col_size as f64 / count as f64;
        if avg < 1.0 {
            return round2(avg) + 8.0;
        }
        round2(avg - avg.log2()) + 8.0
    }

    /// Average width in the spilled row-list format.
    #[must_use]
    pub fn avg_col_size_list_in_disk(&self, count: i64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        if let Some(len) = self.histogram.tp.fixed_len() {
            return len as f64 * self.not_null_ratio();
        }
        let avg = self.histogram.tot_col_size as f64 / count as f64;
        if avg < 1.0 {
            return round2(avg);
        }
        round2(avg - avg.log2())
    }

    fn not_null_ratio(&self) -> f64 {
        let hist_count = self.total_row_count();
        if hist_count > 0.0 {
            1.0 - self.histogram.null_count as f64 / hist_count
        } else {
            1.0
        }
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

    /// Release everything but the scalar metadata and mark the item evicted.
    /// Version 2 keeps its frequency sketch.
    pub fn drop_unnecessary_data(&mut self) {
        if self.stats_ver < VERSION2 {
            self.cm_sketch = None;
        }
        self.top_n = None;
        self.histogram.clear_buckets();
        self.loaded.set_evicted(EvictLevel::AllEvicted);
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.histogram.to_display_string(false))?;
        if let Some(top_n) = &self.top_n {
            write!(f, "\n{top_n}")?;
        }
        Ok(())
    }
}

/// Replace a string by its collation key so it compares bytewise.
fn collation_key(value: &Datum, collation: Collation) -> Datum {
    match value {
        Datum::String(s) => Datum::Bytes(collation.key(s)),
        other => other.clone(),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use optstats_types::FieldType;

    /// Version 2: TopN holds 5 (x10); buckets `[1,4] x8` and `[6,9] x12`, each
    /// upper bound repeating twice; 3 NULLs.
    fn v2_column() -> Column {
        let mut h = Histogram::new(1, 9, 3, 1, FieldType::bigint(), 2, 160);
        h.append_bucket_with_ndv(Datum::Int(1), Datum::Int(4), 8, 2, 4);
        h.append_bucket_with_ndv(Datum::Int(6), Datum::Int(9), 20, 2, 4);
        let top_n = TopN::from_values([(Datum::Int(5), 10)]).unwrap();
        Column::new(100, ColumnInfo::new(1, "a", FieldType::bigint()), h).with_top_n(top_n)
    }

    fn key(v: &Datum) -> Vec<u8> {
        codec::encode_key_to_vec(std::slice::from_ref(v)).unwrap()
    }

    #[test]
    fn test_counts_include_top_n() {
        let c = v2_column();
        assert_eq!(c.total_row_count(), 33.0);
        assert_eq!(c.not_null_count(), 30.0);
        assert_eq!(c.increase_factor(66), 2.0);
        let empty = Column::new(1, ColumnInfo::new(1, "a", FieldType::bigint()), Histogram::new(1, 0, 0, 0, FieldType::bigint(), 0, 0));
        assert_eq!(empty.increase_factor(500), 1.0);
    }

    #[test]
    fn test_equal_row_count_v2() {
        let ctx = StatsContext::default();
        let c = v2_column();
        let five = Datum::Int(5);
        assert_eq!(c.equal_row_count(&ctx, &five, &key(&five), 0), 10.0);
        let four = Datum::Int(4);
        assert_eq!(c.equal_row_count(&ctx, &four, &key(&four), 0), 2.0);
        // Inside [1,4]: 6 non-repeat rows over its 3 other values.
        let two = Datum::Int(2);
        assert_eq!(c.equal_row_count(&ctx, &two, &key(&two), 0), 2.0);
        assert_eq!(c.equal_row_count(&ctx, &Datum::Null, &codec::NULL_KEY, 0), 3.0);
    }

    #[test]
    fn test_equal_row_count_without_bucket_ndv() {
        let ctx = StatsContext::default();
        let mut h = Histogram::new(1, 9, 3, 1, FieldType::bigint(), 2, 160);
        h.append_bucket(Datum::Int(1), Datum::Int(4), 8, 2);
        h.append_bucket(Datum::Int(6), Datum::Int(9), 20, 2);
        let top_n = TopN::from_values([(Datum::Int(5), 10)]).unwrap();
        let c = Column::new(100, ColumnInfo::new(1, "a", FieldType::bigint()), h).with_top_n(top_n);
        // 20 histogram rows over 8 non-TopN values.
        let two = Datum::Int(2);
        assert_eq!(c.equal_row_count(&ctx, &two, &key(&two), 0), 2.5);
        // The upper bound still answers with its repeats.
        let four = Datum::Int(4);
        assert_eq!(c.equal_row_count(&ctx, &four, &key(&four), 0), 2.0);
    }

    #[test]
    fn test_equal_row_count_v1_out_of_range() {
        let ctx = StatsContext::default();
        let c = v2_column().with_stats_ver(1);
        let far = Datum::Int(1000);
        // 23 analyzed rows, 100 realtime: selectivity 1/100.
        let got = c.equal_row_count(&ctx, &far, &key(&far), 100);
        assert!((got - 0.23).abs() < 1e-9, "{got}");
    }

    #[test]
    fn test_column_row_count_ranges() {
        let ctx = StatsContext::default();
        let c = v2_column();
        let rows = c.column_row_count(&ctx, &[Range::point([Datum::Int(5)])], 33, false).unwrap();
        assert_eq!(rows, 10.0);
        // [NULL, +inf] covers every row.
        let all = Range::new([Datum::Null], [Datum::MaxValue], false, false);
        assert_eq!(c.column_row_count(&ctx, &[all], 33, false).unwrap(), 33.0);
        let not_null = Range::full_not_null();
        assert_eq!(c.column_row_count(&ctx, &[not_null], 33, false).unwrap(), 30.0);
        // Handle points count one row each.
        let pts = [Range::point([Datum::Int(5)]), Range::point([Datum::Int(6)])];
        assert_eq!(c.column_row_count(&ctx, &pts, 33, true).unwrap(), 2.0);
        // The result never exceeds the realtime count.
        let all = Range::new([Datum::Null], [Datum::MaxValue], false, false);
        let capped = c.column_row_count(&ctx, &[all], 10, false).unwrap();
        assert!(capped <= 10.0 && (capped - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_is_invalid_queues_evicted_items() {
        let ctx = StatsContext::default();
        let c = v2_column();
        assert!(!c.is_invalid(&ctx, false));
        assert!(c.is_invalid(&ctx, true));
        assert!(ctx.needed_items().is_empty());

        let evicted = v2_column().with_loaded(StatsLoadedStatus::all_evicted());
        assert!(evicted.is_invalid(&ctx, false));
        assert!(ctx.needed_items().contains(TableItemId::column(100, 1)));
    }

    #[test]
    fn test_avg_col_size() {
        let c = v2_column();
        // 3 of 33 rows are NULL.
        assert!((c.avg_col_size(33, true) - 8.0 * 30.0 / 33.0).abs() < 1e-9);
        assert_eq!(c.avg_col_size(33, false), round2(160.0 / 33.0));
        assert_eq!(c.avg_col_size(0, false), 0.0);
        assert_eq!(c.avg_col_size_chunk_format(33), 8.0);

        let mut s = v2_column();
        s.histogram.tp = FieldType::varchar(Collation::Binary);
        // avg 160/20 = 8 bytes: 8 - log2(8) = 5.
        assert_eq!(s.avg_col_size_chunk_format(20), 13.0);
        assert_eq!(s.avg_col_size_list_in_disk(20), 5.0);
        assert_eq!(v2_column().with_handle().avg_col_size(10, false), 8.0);
    }

    #[test]
    fn test_drop_unnecessary_data() {
        let mut c = v2_column();
        let before = c.memory_usage();
        c.drop_unnecessary_data();
        assert!(c.top_n.is_none() && c.histogram.is_empty());
        assert!(c.loaded.is_all_evicted());
        assert!(c.memory_usage().total < before.total);
        assert_eq!(c.histogram.null_count, 3);
    }
}
