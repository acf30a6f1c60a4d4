//! Fixed-rate row counts for ranges over items without usable statistics.

use optstats_error::Result;
use optstats_stats::estimate::{PSEUDO_BETWEEN_RATE, PSEUDO_EQUAL_RATE, PSEUDO_LESS_RATE};
use optstats_types::{Collation, Datum, Range};

/// Divisor applied once per equality position in front of the first range
/// position of an index range.
const PSEUDO_PREFIX_RATE: f64 = 100.0;

/// Row count of position `col_idx` of `ranges` on a table of
/// `table_row_count` rows.
///
/// `[NULL, +inf]` keeps every row, `(-inf, +inf]` every non-NULL row, a
/// one-sided range a third, a point a thousandth and any other interval a
/// fortieth.
///
/// # Errors
///
/// Fails when the bounds of a closed interval cannot be compared.
pub fn pseudo_row_count_by_column_ranges(table_row_count: f64, ranges: &[Range], col_idx: usize) -> Result<f64> {
    let mut row_count = 0.0;
    for rg in ranges {
        let (low, high) = (&rg.low[col_idx], &rg.high[col_idx]);
        row_count += match (low, high) {
            (Datum::Null, Datum::MaxValue) => table_row_count,
            (Datum::MinNotNull, Datum::MaxValue) => table_row_count - table_row_count / PSEUDO_EQUAL_RATE,
            (Datum::MinNotNull, _) => table_row_count / PSEUDO_LESS_RATE - table_row_count / PSEUDO_EQUAL_RATE,
            (_, Datum::MaxValue) => table_row_count / PSEUDO_LESS_RATE,
            _ if low.compare(high, Collation::Binary)?.is_eq() => table_row_count / PSEUDO_EQUAL_RATE,
            _ => table_row_count / PSEUDO_BETWEEN_RATE,
        };
    }
    Ok(row_count.min(table_row_count))
}

/// Row count of index `ranges` on a table of `table_row_count` rows.
///
/// `cols_len` is the column count of a unique index, -1 otherwise; a closed
/// point over every column of a unique index is one row. Every equality
/// position before the first range position divides by 100.
///
/// # Errors
///
/// Fails when range bounds cannot be compared.
pub fn pseudo_row_count_by_index_ranges(ranges: &[Range], table_row_count: f64, cols_len: i64) -> Result<f64> {
    if table_row_count == 0.0 {
        return Ok(0.0);
    }
    let mut total = 0.0;
    for rg in ranges {
        let mut i = rg.prefix_equal_len()?;
        if i as i64 == cols_len && !rg.low_exclude && !rg.high_exclude {
            total += 1.0;
            continue;
        }
        if i >= rg.low.len() {
            i = rg.low.len().saturating_sub(1);
        }
        let column = rg.column_at(i, rg.low_exclude, rg.high_exclude);
        let mut count = pseudo_row_count_by_column_ranges(table_row_count, &[column], 0)?;
        for _ in 0..i {
            count /= PSEUDO_PREFIX_RATE;
        }
        total += count;
    }
    if total > table_row_count {
        total = table_row_count / PSEUDO_LESS_RATE;
    }
    Ok(total)
}

/// Row count of signed integer handle ranges; a point is one row.
#[must_use]
pub fn pseudo_row_count_by_signed_int_ranges(ranges: &[Range], table_row_count: f64) -> f64 {
    let mut row_count = 0.0;
    for rg in ranges {
        let low = match &rg.low[0] {
            Datum::Int(v) => *v,
            Datum::Uint(v) => i64::try_from(*v).unwrap_or(i64::MAX),
            _ => i64::MIN,
        };
        let high = match &rg.high[0] {
            Datum::Int(v) => *v,
            Datum::Uint(v) => i64::try_from(*v).unwrap_or(i64::MAX),
            Datum::Null | Datum::MinNotNull => i64::MIN,
            _ => i64::MAX,
        };
        let cnt = if low == i64::MIN && high == i64::MAX {
            table_row_count
        } else if low == i64::MIN || high == i64::MAX {
            table_row_count / PSEUDO_LESS_RATE
        } else if low == high {
            1.0
        } else {
            table_row_count / PSEUDO_BETWEEN_RATE
        };
        let span = i128::from(high) - i128::from(low);
        row_count += if span > 0 && cnt > span as f64 { span as f64 } else { cnt };
    }
    row_count.min(table_row_count)
}

/// Row count of unsigned integer handle ranges; a point is one row.
#[must_use]
pub fn pseudo_row_count_by_unsigned_int_ranges(ranges: &[Range], table_row_count: f64) -> f64 {
    let mut row_count = 0.0;
    for rg in ranges {
        let low = match &rg.low[0] {
            Datum::Uint(v) => *v,
            Datum::Int(v) => u64::try_from(*v).unwrap_or(0),
            _ => 0,
        };
        let high = match &rg.high[0] {
            Datum::Uint(v) => *v,
            Datum::Int(v) => u64::try_from(*v).unwrap_or(0),
            Datum::Null | Datum::MinNotNull => 0,
            _ => u64::MAX,
        };
        let cnt = if low == 0 && high == u64::MAX {
            table_row_count
        } else if low == 0 || high == u64::MAX {
            table_row_count / PSEUDO_LESS_RATE
        } else if low == high {
            1.0
        } else {
            table_row_count / PSEUDO_BETWEEN_RATE
        };
        let span = high.saturating_sub(low);
        row_count += if span > 0 && cnt > span as f64 { span as f64 } else { cnt };
    }
    row_count.min(table_row_count)
}
