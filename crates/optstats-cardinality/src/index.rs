//! Multi-column index range estimation.
//!
//! A range is split into its equality prefix and at most one trailing range
//! position. The prefix is estimated as a point selectivity on the index,
//! cross-checked against the per-column statistics; the trailing position
//! is counted through a [`RangeRowCounter`] and applied as a further
//! selectivity.

use optstats_error::{Result, StatsError};
use optstats_stats::{HistColl, Index, StatsContext, out_of_range_eq_selectivity};
use optstats_types::{Range, codec, enum_range_values};
use serde_json::json;

use crate::counter::{RangeRowCounter, StatsRangeCounter};
use crate::trace::{end_estimate_range, start_estimate_range};

/// Index estimator over a range counter for trailing range positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Estimator<R = StatsRangeCounter> {
    counter: R,
}

impl<R: RangeRowCounter> Estimator<R> {
    #[must_use]
    pub const fn new(counter: R) -> Self {
        Self { counter }
    }

    #[must_use]
    pub const fn counter(&self) -> &R {
        &self.counter
    }

    /// Rows of index `idx_id` matching any of `ranges`, never more than the
    /// index's analyzed row count.
    ///
    /// # Errors
    ///
    /// Fails when the index is not in `coll`, a range has lower and upper
    /// bounds of different lengths, a bound cannot be encoded, or the range
    /// counter fails.
    pub fn index_row_count(&self, ctx: &StatsContext, coll: &HistColl, idx_id: i64, ranges: &[Range]) -> Result<f64> {
        let _scope = ctx.trace_scope("GetIndexRowCount");
        let idx = coll
            .indices
            .get(&idx_id)
            .ok_or_else(|| StatsError::internal(format!("index {idx_id} has no statistics in table {}", coll.physical_id)))?;
        let idx_total = idx.total_row_count();
        let mut total_count = 0.0;
        for rg in ranges {
            if rg.low.len() != rg.high.len() {
                return Err(StatsError::internal(format!(
                    "range {rg} has {} lower and {} upper values",
                    rg.low.len(),
                    rg.high.len()
                )));
            }
            let _range_scope = start_estimate_range(ctx, rg, total_count);
            let mut pos = rg.ordinal_of_range_cond();
            let mut enum_values = None;
            if pos != rg.low.len() {
                enum_values = enum_range_values(&rg.low[pos], &rg.high[pos], rg.low_exclude, rg.high_exclude);
                if enum_values.is_some() {
                    pos += 1;
                }
            }
            // CM sketches hold no NULL keys of a single-column index.
            if pos == 0 || (idx.info.columns.len() == 1 && rg.is_null_point()) {
                let count = idx.row_count(ctx, std::slice::from_ref(rg), coll.realtime_count)?;
                end_estimate_range(ctx, count);
                total_count += count;
                continue;
            }

            let mut selectivity = match &enum_values {
                None => {
                    let bytes = codec::encode_key_to_vec(&rg.low[..pos])?;
                    self.equal_cond_selectivity(ctx, coll, idx, &bytes, pos, rg)?
                }
                Some(values) => {
                    let mut bytes = codec::encode_key_to_vec(&rg.low[..pos - 1])?;
                    let prefix_len = bytes.len();
                    let mut sum = 0.0;
                    for value in values {
                        bytes.truncate(prefix_len);
                        codec::encode_key(&mut bytes, std::slice::from_ref(value))?;
                        sum += self.equal_cond_selectivity(ctx, coll, idx, &bytes, pos, rg)?;
                    }
                    sum
                }
            };

            if pos != rg.low.len() {
                let tail = rg.column_at(pos, rg.low_exclude, rg.high_exclude);
                let col_id = coll
                    .idx_to_column_ids
                    .get(&idx_id)
                    .and_then(|ids| ids.get(pos))
                    .copied()
                    .unwrap_or(-1);
                // Index statistics on the column beat its column statistics.
                let count = match coll.col_id_to_idx_ids.get(&col_id).and_then(|ids| ids.first()) {
                    Some(&leading_idx) => {
                        self.counter
                            .row_count_by_index_ranges(ctx, coll, leading_idx, std::slice::from_ref(&tail))?
                    }
                    None => self
                        .counter
                        .row_count_by_column_ranges(ctx, coll, col_id, std::slice::from_ref(&tail))?,
                };
                selectivity = selectivity * count / idx_total;
            }
            let count = selectivity * idx_total;
            end_estimate_range(ctx, count);
            total_count += count;
        }
        Ok(total_count.min(idx_total))
    }

    /// Selectivity of the equality prefix `bytes`, the key encoding of the
    /// first `used_cols_len` values of `range`.
    ///
    /// # Errors
    ///
    /// Fails when a column estimate of the cross-check fails.
    pub fn equal_cond_selectivity(
        &self,
        ctx: &StatsContext,
        coll: &HistColl,
        idx: &Index,
        bytes: &[u8],
        used_cols_len: usize,
        range: &Range,
    ) -> Result<f64> {
        let _scope = ctx.trace_scope("getEqualCondSelectivity");
        let result = self.equal_cond_selectivity_inner(ctx, coll, idx, bytes, used_cols_len, range);
        ctx.trace_values([
            ("Index Name", json!(idx.info.name)),
            ("Encoded", json!(bytes)),
            ("UsedColLen", json!(used_cols_len)),
            ("Range", json!(range.to_string())),
            ("Result", json!(result.as_ref().ok())),
            ("error", json!(result.as_ref().err().map(ToString::to_string))),
        ]);
        result
    }

    fn equal_cond_selectivity_inner(
        &self,
        ctx: &StatsContext,
        coll: &HistColl,
        idx: &Index,
        bytes: &[u8],
        used_cols_len: usize,
        range: &Range,
    ) -> Result<f64> {
        let cover_all = idx.info.columns.len() == used_cols_len;
        // At most one row.
        if idx.info.unique && cover_all {
            return Ok(1.0 / idx.total_row_count());
        }
        if idx.out_of_range(bytes) {
            let total = idx.total_row_count() as i64;
            if idx.histogram.ndv > 0 && cover_all {
                return Ok(out_of_range_eq_selectivity(
                    Some(ctx),
                    idx.histogram.ndv,
                    coll.realtime_count,
                    total,
                ));
            }
            // Only a prefix is constrained; take the widest prefix column.
            let ndv = coll
                .idx_to_column_ids
                .get(&idx.id())
                .into_iter()
                .flatten()
                .take(used_cols_len)
                .filter_map(|col_id| coll.columns.get(col_id))
                .map(|col| col.histogram.ndv)
                .max()
                .unwrap_or(0);
            return Ok(out_of_range_eq_selectivity(Some(ctx), ndv, coll.realtime_count, total));
        }

        let (min_row_count, cross_validation) =
            self.cross_validation_selectivity(ctx, coll, idx, used_cols_len, range)?;
        let idx_count = idx.query_bytes(bytes) as f64;
        if min_row_count < idx_count {
            return Ok(cross_validation);
        }
        Ok(idx_count / idx.total_row_count())
    }

    /// Independent per-column point selectivity of the first `used_cols_len`
    /// index columns, with the smallest per-column row count. Columns with
    /// invalid statistics are skipped; with none left the result is
    /// `(f64::MAX, 1.0)`.
    ///
    /// # Errors
    ///
    /// Fails when a column estimate fails.
    pub fn cross_validation_selectivity(
        &self,
        ctx: &StatsContext,
        coll: &HistColl,
        idx: &Index,
        used_cols_len: usize,
        range: &Range,
    ) -> Result<(f64, f64)> {
        let _scope = ctx.trace_scope("crossValidationSelectivity");
        let mut min_row_count = f64::MAX;
        let mut selectivity = 1.0;
        let total = idx.total_row_count();
        let col_ids = coll.idx_to_column_ids.get(&idx.id()).map_or(&[][..], Vec::as_slice);
        for (i, col_id) in col_ids.iter().take(used_cols_len).enumerate() {
            let Some(col) = coll.columns.get(col_id) else {
                continue;
            };
            if col.is_invalid(ctx, coll.pseudo) {
                continue;
            }
            // Closed on both ends, or the point would count no rows.
            let point = range.column_at(i, false, false);
            let row_count = col.column_row_count(ctx, std::slice::from_ref(&point), coll.realtime_count, col.is_handle)?;
            selectivity *= row_count / total;
            min_row_count = min_row_count.min(row_count);
        }
        ctx.trace_values([
            ("Index Name", json!(idx.info.name)),
            ("minRowCount", json!(min_row_count)),
            ("crossValidationSelectivity", json!(selectivity)),
        ]);
        Ok((min_row_count, selectivity))
    }
}
