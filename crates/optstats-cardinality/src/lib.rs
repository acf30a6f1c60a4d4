//! Row-count and selectivity estimation over optimizer statistics.
//!
//! - [`row_count`]: equality, less, greater and between counts of one column.
//! - [`counter`]: range counts of a column or index, with the pseudo fallback.
//! - [`index`]: multi-column index ranges, split into an equality prefix and
//!   a trailing range.
//! - [`selectivity`]: filters evaluated directly over TopN, histogram bounds
//!   and NULL.
//! - [`trace`]: CE trace, used-stats and debug-trace records.
//!
//! Every estimate reads an immutable [`optstats_stats::HistColl`] snapshot.
//! Missing or stale statistics degrade to heuristics; only encoding and
//! evaluation failures are errors.

pub mod counter;
pub mod index;
pub mod pseudo;
pub mod row_count;
pub mod selectivity;
pub mod trace;

pub use counter::{RangeRowCounter, StatsRangeCounter};
pub use index::Estimator;
pub use pseudo::{
    pseudo_row_count_by_column_ranges, pseudo_row_count_by_index_ranges, pseudo_row_count_by_signed_int_ranges,
    pseudo_row_count_by_unsigned_int_ranges,
};
pub use row_count::{column_between_row_count, column_equal_row_count, column_greater_row_count, column_less_row_count};
pub use selectivity::selectivity_by_filter;
pub use trace::{ce_trace_expr, ce_trace_range, debug_trace_row_count_input, ranges_to_string, record_used_item_stats_status};
