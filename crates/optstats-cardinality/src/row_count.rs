//! Single-value row counts of one column.
//!
//! Missing or invalid statistics give a fixed fraction of the realtime row
//! count. Otherwise the summaries answer and the result is scaled by the
//! column's increase factor.

use std::slice;

use optstats_error::Result;
use optstats_stats::estimate::{PSEUDO_BETWEEN_RATE, PSEUDO_EQUAL_RATE, PSEUDO_LESS_RATE};
use optstats_stats::{Column, HistColl, StatsContext};
use optstats_types::Datum;
use optstats_types::codec;

fn valid_column<'a>(ctx: &StatsContext, coll: &'a HistColl, col_id: i64) -> Option<&'a Column> {
    coll.columns
        .get(&col_id)
        .map(AsRef::as_ref)
        .filter(|c| !c.is_invalid(ctx, coll.pseudo))
}

/// Rows where the column is greater than `value`.
pub fn column_greater_row_count(ctx: &StatsContext, coll: &HistColl, value: &Datum, col_id: i64) -> f64 {
    match valid_column(ctx, coll, col_id) {
        Some(c) => c.greater_row_count(value) * c.increase_factor(coll.realtime_count),
        None => coll.realtime_count as f64 / PSEUDO_LESS_RATE,
    }
}

/// Rows where the column is less than `value`, NULLs excluded.
pub fn column_less_row_count(ctx: &StatsContext, coll: &HistColl, value: &Datum, col_id: i64) -> f64 {
    match valid_column(ctx, coll, col_id) {
        Some(c) => c.less_row_count(value) * c.increase_factor(coll.realtime_count),
        None => coll.realtime_count as f64 / PSEUDO_LESS_RATE,
    }
}

/// Rows where the column is in `[low, high)`; a NULL `low` adds the NULL
/// rows.
///
/// # Errors
///
/// Fails when a bound cannot be encoded.
pub fn column_between_row_count(
    ctx: &StatsContext,
    coll: &HistColl,
    low: &Datum,
    high: &Datum,
    col_id: i64,
) -> Result<f64> {
    let Some(c) = valid_column(ctx, coll, col_id) else {
        return Ok(coll.realtime_count as f64 / PSEUDO_BETWEEN_RATE);
    };
    let low_encoded = codec::encode_key_to_vec(slice::from_ref(low))?;
    let high_encoded = codec::encode_key_to_vec(slice::from_ref(high))?;
    let mut count = c.between_row_count(low, high, &low_encoded, &high_encoded);
    if low.is_null() {
        count += c.histogram.null_count as f64;
    }
    Ok(count * c.increase_factor(coll.realtime_count))
}

/// Rows where the column equals `value`.
///
/// # Errors
///
/// Fails when `value` cannot be encoded.
pub fn column_equal_row_count(ctx: &StatsContext, coll: &HistColl, value: &Datum, col_id: i64) -> Result<f64> {
    let Some(c) = valid_column(ctx, coll, col_id) else {
        return Ok(coll.realtime_count as f64 / PSEUDO_EQUAL_RATE);
    };
    let encoded = codec::encode_key_to_vec(slice::from_ref(value))?;
    // The out-of-range extrapolation sees the modification count as the
    // realtime row count on this path.
    let count = c.equal_row_count(ctx, value, &encoded, coll.modify_count);
    Ok(count * c.increase_factor(coll.realtime_count))
}
