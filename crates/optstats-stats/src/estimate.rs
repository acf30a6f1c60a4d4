//! Heuristic constants and extrapolation shared by all estimators.

use serde_json::json;

use crate::context::StatsContext;

/// Equality selects `1 / PSEUDO_EQUAL_RATE` of the rows without statistics.
pub const PSEUDO_EQUAL_RATE: f64 = 1000.0;
/// Less-than and greater-than select `1 / PSEUDO_LESS_RATE`.
pub const PSEUDO_LESS_RATE: f64 = 3.0;
/// Between selects `1 / PSEUDO_BETWEEN_RATE`.
pub const PSEUDO_BETWEEN_RATE: f64 = 40.0;
/// Width of a column without statistics, in bytes.
pub const PSEUDO_COL_SIZE: f64 = 8.0;
/// Row count assumed for a table that was never analyzed.
pub const PSEUDO_ROW_COUNT: i64 = 10000;
/// Statistics version of pseudo statistics.
pub const PSEUDO_VERSION: u64 = 0;
/// Smallest NDV used when extrapolating out-of-range values.
pub const OUT_OF_RANGE_BETWEEN_RATE: i64 = 100;

/// Statistics format versions.
pub const VERSION0: i64 = 0;
pub const VERSION1: i64 = 1;
/// TopN, histogram and NULL count partition every row.
pub const VERSION2: i64 = 2;

/// Selectivity of an equality on a value outside the analyzed range.
///
/// Treats every row added since analyze as a new row drawn from the same
/// distribution, so each distinct value gets `analyzed / ndv` of them, and a
/// single value never matches more rows than were added.
#[must_use]
pub fn out_of_range_eq_selectivity(
    ctx: Option<&StatsContext>,
    ndv: i64,
    realtime_row_count: i64,
    column_row_count: i64,
) -> f64 {
    let _scope = ctx.and_then(|c| c.trace_scope("outOfRangeEQSelectivity"));
    let result = out_of_range_eq_selectivity_inner(ndv, realtime_row_count, column_row_count);
    if let Some(ctx) = ctx {
        ctx.trace_values([("Result", json!(result))]);
    }
    result
}

fn out_of_range_eq_selectivity_inner(ndv: i64, realtime_row_count: i64, column_row_count: i64) -> f64 {
    let increase = realtime_row_count - column_row_count;
    if increase <= 0 {
        // The histogram saw every row.
        return 0.0;
    }
    let ndv = ndv.max(OUT_OF_RANGE_BETWEEN_RATE);
    let selectivity = 1.0 / ndv as f64;
    if selectivity * column_row_count as f64 > increase as f64 {
        return increase as f64 / column_row_count as f64;
    }
    selectivity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_growth_is_zero() {
        assert_eq!(out_of_range_eq_selectivity(None, 10, 100, 100), 0.0);
        assert_eq!(out_of_range_eq_selectivity(None, 10, 90, 100), 0.0);
    }

    #[test]
    fn test_ndv_floor_and_growth_cap() {
        // ndv 10 is raised to 100.
        assert_eq!(out_of_range_eq_selectivity(None, 10, 2000, 1000), 0.01);
        assert_eq!(out_of_range_eq_selectivity(None, 500, 2000, 1000), 1.0 / 500.0);
        // 1/100 of 1000 analyzed rows would exceed the 5 new rows.
        assert_eq!(out_of_range_eq_selectivity(None, 10, 1005, 1000), 0.005);
    }

    #[test]
    fn test_trace_records_result() {
        let ctx = StatsContext::default().with_debug_trace(true);
        out_of_range_eq_selectivity(Some(&ctx), 10, 2000, 1000);
        assert_eq!(
            ctx.debug_trace_json(),
            json!([{ "outOfRangeEQSelectivity": [{ "Result": 0.01 }] }])
        );
    }
}
