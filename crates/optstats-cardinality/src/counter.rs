//! Range row counting over a statistics collection.
//!
//! [`RangeRowCounter`] is the seam the multi-column index estimator calls
//! back into for the tail range of a partially equal index range.
//! [`StatsRangeCounter`] is the statistics-backed implementation.

use optstats_error::{Result, StatsError};
use optstats_stats::estimate::VERSION1;
use optstats_stats::{HistColl, StatsContext};
use optstats_types::{Datum, Range};
use tracing::trace_span;

use crate::index::Estimator;
use crate::pseudo::{
    pseudo_row_count_by_column_ranges, pseudo_row_count_by_index_ranges, pseudo_row_count_by_signed_int_ranges,
    pseudo_row_count_by_unsigned_int_ranges,
};
use crate::trace::{ce_trace_range, debug_trace_row_count_input, record_used_item_stats_status};

/// Row counts of ranges over one column or index of `coll`.
pub trait RangeRowCounter {
    /// Rows matching any of the multi-column `ranges` on index `idx_id`.
    fn row_count_by_index_ranges(
        &self,
        ctx: &StatsContext,
        coll: &HistColl,
        idx_id: i64,
        ranges: &[Range],
    ) -> Result<f64>;

    /// Rows matching any of the single-column `ranges` on column `col_id`.
    fn row_count_by_column_ranges(
        &self,
        ctx: &StatsContext,
        coll: &HistColl,
        col_id: i64,
        ranges: &[Range],
    ) -> Result<f64>;

    /// Rows matching any of the integer handle `ranges` on column `col_id`.
    fn row_count_by_int_column_ranges(
        &self,
        ctx: &StatsContext,
        coll: &HistColl,
        col_id: i64,
        ranges: &[Range],
    ) -> Result<f64>;
}

/// Counts ranges from the statistics in the collection, falling back to
/// fixed rates when the item is missing or invalid.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsRangeCounter;

impl RangeRowCounter for StatsRangeCounter {
    fn row_count_by_index_ranges(
        &self,
        ctx: &StatsContext,
        coll: &HistColl,
        idx_id: i64,
        ranges: &[Range],
    ) -> Result<f64> {
        let _span = trace_span!("row_count_by_index_ranges", table_id = coll.physical_id, idx_id).entered();
        let _scope = ctx.trace_scope("GetRowCountByIndexRanges");
        debug_trace_row_count_input(ctx, idx_id, ranges);
        let idx = coll.indices.get(&idx_id);
        record_used_item_stats_status(ctx, coll.physical_id, idx_id, true, idx.map(|i| i.loaded));
        let col_names: Vec<String> = idx
            .map(|i| i.info.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default();

        let Some(idx) = idx.filter(|i| !i.is_invalid(ctx, coll.pseudo)) else {
            let cols_len = idx
                .filter(|i| i.info.unique)
                .map_or(-1, |i| i.info.columns.len() as i64);
            let result = pseudo_row_count_by_index_ranges(ranges, coll.realtime_count as f64, cols_len)?;
            if ctx.ce_trace_enabled() && idx.is_some() {
                ce_trace_range(ctx, coll.physical_id, &col_names, ranges, "Index Stats-Pseudo", result as u64);
            }
            return Ok(result);
        };

        let result = if idx.cm_sketch.is_some() && idx.stats_ver == VERSION1 {
            Estimator::new(*self).index_row_count(ctx, coll, idx_id, ranges)?
        } else {
            idx.row_count(ctx, ranges, coll.realtime_count)?
        };
        if ctx.ce_trace_enabled() {
            ce_trace_range(ctx, coll.physical_id, &col_names, ranges, "Index Stats", result as u64);
        }
        Ok(result)
    }

    fn row_count_by_column_ranges(
        &self,
        ctx: &StatsContext,
        coll: &HistColl,
        col_id: i64,
        ranges: &[Range],
    ) -> Result<f64> {
        let _span = trace_span!("row_count_by_column_ranges", table_id = coll.physical_id, col_id).entered();
        let _scope = ctx.trace_scope("GetRowCountByColumnRanges");
        debug_trace_row_count_input(ctx, col_id, ranges);
        let col = coll.columns.get(&col_id);
        record_used_item_stats_status(ctx, coll.physical_id, col_id, false, col.map(|c| c.loaded));

        let Some(c) = col.filter(|c| !c.is_invalid(ctx, coll.pseudo)) else {
            let result = pseudo_row_count_by_column_ranges(coll.realtime_count as f64, ranges, 0)?;
            if let Some(c) = col.filter(|_| ctx.ce_trace_enabled()) {
                let names = [c.info.name.clone()];
                ce_trace_range(ctx, coll.physical_id, &names, ranges, "Column Stats-Pseudo", result as u64);
            }
            return Ok(result);
        };

        let result = c.column_row_count(ctx, ranges, coll.realtime_count, false)?;
        if ctx.ce_trace_enabled() {
            let names = [c.info.name.clone()];
            ce_trace_range(ctx, coll.physical_id, &names, ranges, "Column Stats", result as u64);
        }
        Ok(result)
    }

    fn row_count_by_int_column_ranges(
        &self,
        ctx: &StatsContext,
        coll: &HistColl,
        col_id: i64,
        ranges: &[Range],
    ) -> Result<f64> {
        let _span = trace_span!("row_count_by_int_column_ranges", table_id = coll.physical_id, col_id).entered();
        let _scope = ctx.trace_scope("GetRowCountByIntColumnRanges");
        debug_trace_row_count_input(ctx, col_id, ranges);
        let col = coll.columns.get(&col_id);
        record_used_item_stats_status(ctx, coll.physical_id, col_id, false, col.map(|c| c.loaded));

        let Some(c) = col.filter(|c| !c.is_invalid(ctx, coll.pseudo)) else {
            let Some(first) = ranges.first() else {
                return Ok(0.0);
            };
            let low = first
                .low
                .first()
                .ok_or_else(|| StatsError::internal("integer range without a lower bound"))?;
            let table_row_count = coll.realtime_count as f64;
            let result = if matches!(low, Datum::Int(_)) {
                pseudo_row_count_by_signed_int_ranges(ranges, table_row_count)
            } else {
                pseudo_row_count_by_unsigned_int_ranges(ranges, table_row_count)
            };
            if let Some(c) = col.filter(|_| ctx.ce_trace_enabled()) {
                let names = [c.info.name.clone()];
                ce_trace_range(ctx, coll.physical_id, &names, ranges, "Column Stats-Pseudo", result as u64);
            }
            return Ok(result);
        };

        // The column is the handle: a closed point is one row.
        let result = c.column_row_count(ctx, ranges, coll.realtime_count, true)?;
        if ctx.ce_trace_enabled() {
            let names = [c.info.name.clone()];
            ce_trace_range(ctx, coll.physical_id, &names, ranges, "Column Stats", result as u64);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optstats_stats::{Column, Histogram, Index, StatsLoadedStatus};
    use optstats_types::{ColumnInfo, FieldType, IndexColumn, IndexInfo};

    fn int_column(id: i64) -> Column {
        let mut h = Histogram::new(id, 10, 0, 1, FieldType::bigint(), 1, 80);
        h.append_bucket_with_ndv(Datum::Int(1), Datum::Int(10), 10, 1, 10);
        Column::new(1, ColumnInfo::new(id, &format!("c{id}"), FieldType::bigint()), h)
    }

    #[test]
    fn test_column_ranges_use_statistics() {
        let ctx = StatsContext::default().with_ce_trace(true);
        let coll = HistColl::new(1, 10, 0).with_column(int_column(1));
        let point = [Range::point([Datum::Int(10)])];
        let count = StatsRangeCounter
            .row_count_by_column_ranges(&ctx, &coll, 1, &point)
            .unwrap();
        assert_eq!(count, 1.0);
        let trace = ctx.ce_trace();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].kind, "Column Stats-Point");
        assert_eq!(trace[0].expr, "`eq`(c1, 10)");
        assert!(ctx.used_stats().is_empty());
    }

    #[test]
    fn test_missing_column_is_pseudo_and_recorded() {
        let ctx = StatsContext::default().with_ce_trace(true);
        let coll = HistColl::new(1, 10000, 0);
        let point = [Range::point([Datum::Int(3)])];
        let count = StatsRangeCounter
            .row_count_by_column_ranges(&ctx, &coll, 2, &point)
            .unwrap();
        assert_eq!(count, 10.0);
        // No statistics object to name the column after.
        assert!(ctx.ce_trace().is_empty());
        assert_eq!(ctx.used_stats()[&1].column_status[&2], "missing");
    }

    #[test]
    fn test_evicted_column_is_pseudo() {
        let ctx = StatsContext::default().with_ce_trace(true);
        let coll = HistColl::new(1, 10000, 0)
            .with_column(int_column(1).with_loaded(StatsLoadedStatus::all_evicted()));
        let count = StatsRangeCounter
            .row_count_by_column_ranges(&ctx, &coll, 1, &[Range::full_not_null()])
            .unwrap();
        assert_eq!(count, 9990.0);
        assert_eq!(ctx.ce_trace()[0].kind, "Column Stats-Pseudo-Range");
        assert_eq!(ctx.used_stats()[&1].column_status[&1], "allEvicted");
    }

    #[test]
    fn test_int_column_ranges() {
        let ctx = StatsContext::default();
        let coll = HistColl::new(1, 10, 0).with_column(int_column(1).with_handle());
        let point = [Range::point([Datum::Int(4)])];
        assert_eq!(
            StatsRangeCounter
                .row_count_by_int_column_ranges(&ctx, &coll, 1, &point)
                .unwrap(),
            1.0
        );
        let pseudo = HistColl::new(1, 10000, 0);
        assert_eq!(
            StatsRangeCounter
                .row_count_by_int_column_ranges(&ctx, &pseudo, 1, &point)
                .unwrap(),
            1.0
        );
        let upper = [Range::new([Datum::Uint(5)], [Datum::MaxValue], false, false)];
        let count = StatsRangeCounter
            .row_count_by_int_column_ranges(&ctx, &pseudo, 1, &upper)
            .unwrap();
        assert!((count - 10000.0 / 3.0).abs() < 1e-9);
        assert_eq!(
            StatsRangeCounter
                .row_count_by_int_column_ranges(&ctx, &pseudo, 1, &[])
                .unwrap(),
            0.0
        );
    }

    #[test]
    fn test_missing_unique_index_is_pseudo() {
        let ctx = StatsContext::default().with_ce_trace(true);
        let info = IndexInfo::new(4, "uk", vec![IndexColumn::new("a", 0)]).unique();
        let idx = Index::new(1, info, Histogram::new(4, 0, 0, 1, FieldType::blob(), 0, 0))
            .with_loaded(StatsLoadedStatus::uninitialized());
        let coll = HistColl::new(1, 10000, 0).with_index(idx);
        let point = [Range::point([Datum::Int(3)])];
        let count = StatsRangeCounter
            .row_count_by_index_ranges(&ctx, &coll, 4, &point)
            .unwrap();
        assert_eq!(count, 1.0);
        assert_eq!(ctx.ce_trace()[0].kind, "Index Stats-Pseudo-Point");
        assert_eq!(ctx.ce_trace()[0].expr, "`eq`(a, 3)");
        assert_eq!(ctx.used_stats()[&1].index_status[&4], "unInitialized");
    }
}
