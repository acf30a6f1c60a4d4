//! Selectivity of single-column filters by evaluating them over statistics.
//!
//! With format version 2 statistics the TopN, the histogram and the NULL
//! count partition every analyzed row. The filters are evaluated against the
//! TopN values, the histogram bounds and a NULL: TopN matches count exactly,
//! a matching upper bound counts its bucket's repeats exactly, and lower
//! bounds act as a sample for the remaining, non-repeated rows.

use optstats_error::Result;
use optstats_stats::estimate::VERSION2;
use optstats_stats::{AvailableStats, HistColl, Histogram, StatsContext, TopN};
use optstats_types::codec;
use optstats_types::expr::{contains_correlated, extract_columns, vectorized_filter};
use optstats_types::{Datum, Expr};
use serde_json::json;
use tracing::debug;

/// Statistics of the one column the filters reference.
struct FilterStats<'a> {
    stats_ver: i64,
    histogram: &'a Histogram,
    top_n: Option<&'a TopN>,
    /// Histogram bounds are key encodings of the column value.
    encoded_bounds: bool,
}

/// Selectivity of the conjunction of `filters` over `coll`, or `None` when
/// this method does not apply: a filter is volatile or correlated, the
/// filters reference other than exactly one column, that column is a string
/// under a non-binary collation with new collations on, or its statistics
/// are not usable version 2 statistics.
///
/// The result is relative to the analyzed rows; it is not scaled for rows
/// added since.
///
/// # Errors
///
/// Fails when a TopN value cannot be decoded or the filters fail on a TopN
/// value or histogram bound. Failures evaluating the NULL row count as no
/// match.
pub fn selectivity_by_filter(ctx: &StatsContext, coll: &HistColl, filters: &[Expr]) -> Result<Option<f64>> {
    let _scope = ctx.trace_scope("GetSelectivityByFilter");
    if filters.iter().any(Expr::has_mutable_effects) || contains_correlated(filters) {
        return Ok(None);
    }
    let cols = extract_columns(filters);
    let [col] = cols.as_slice() else {
        return Ok(None);
    };
    let tp = &col.ret_type;
    if tp.is_string() && ctx.new_collation_enabled() && !tp.collation.is_bin() {
        return Ok(None);
    }

    let Some(stats) = available_stats(ctx, coll, col.unique_id) else {
        return Ok(None);
    };
    if stats.stats_ver != VERSION2 {
        return Ok(None);
    }
    let hist = stats.histogram;
    let top_n_total = stats.top_n.map_or(0, TopN::total_count) as f64;
    let hist_total = hist.not_null_count();
    let null_count = hist.null_count as f64;
    let total = top_n_total + hist_total + null_count;

    let mut top_n_selected = 0_u64;
    if let Some(top_n) = stats.top_n {
        let values = top_n.decoded_values()?;
        let selected = vectorized_filter(filters, &values)?;
        for (item, keep) in top_n.items().iter().zip(selected) {
            if keep {
                top_n_selected += item.count;
            }
        }
    }
    let top_n_sel = top_n_selected as f64 / total;

    let mut hist_sel = 0.0;
    if hist_total > 0.0 {
        let bounds = if stats.encoded_bounds {
            decode_bounds(hist.bounds())?
        } else {
            hist.bounds().to_vec()
        };
        let selected = vectorized_filter(filters, &bounds)?;
        let mut repeat_total = 0_i64;
        let mut repeat_selected = 0_i64;
        let mut lower_matches = 0_i64;
        for (i, bucket) in hist.buckets().iter().enumerate() {
            repeat_total += bucket.repeat;
            if selected.get(2 * i).copied().unwrap_or(false) {
                lower_matches += 1;
            }
            if selected.get(2 * i + 1).copied().unwrap_or(false) {
                repeat_selected += bucket.repeat;
            }
        }
        let upper_ratio = (repeat_total as f64 / hist_total).min(1.0);
        let lower_ratio = 1.0 - upper_ratio;
        let upper_sel = if repeat_total > 0 {
            repeat_selected as f64 / repeat_total as f64
        } else {
            0.0
        };
        let lower_sel = lower_matches as f64 / hist.len() as f64;
        hist_sel = (lower_sel * lower_ratio + upper_sel * upper_ratio) * hist_total / total;
    }

    let null_sel = match vectorized_filter(filters, &[Datum::Null]) {
        Ok(selected) if selected == [true] => null_count / total,
        Ok(_) => 0.0,
        Err(err) => {
            debug!(error = %err, "filter evaluation on NULL failed, counting no NULL rows");
            0.0
        }
    };

    let result = top_n_sel + hist_sel + null_sel;
    ctx.trace_values([
        ("TopN Selectivity", json!(top_n_sel)),
        ("Histogram Selectivity", json!(hist_sel)),
        ("NULL Selectivity", json!(null_sel)),
        ("Result", json!(result)),
    ]);
    Ok(Some(result))
}

fn available_stats<'a>(ctx: &StatsContext, coll: &'a HistColl, unique_id: i64) -> Option<FilterStats<'a>> {
    match coll.find_available_stats_for_col(ctx, unique_id)? {
        AvailableStats::Column(id) => coll.columns.get(&id).map(|c| FilterStats {
            stats_ver: c.stats_ver,
            histogram: &c.histogram,
            top_n: c.top_n.as_ref(),
            encoded_bounds: false,
        }),
        AvailableStats::Index(id) => coll.indices.get(&id).map(|i| FilterStats {
            stats_ver: i.stats_ver,
            histogram: &i.histogram,
            top_n: i.top_n.as_ref(),
            encoded_bounds: true,
        }),
    }
}

fn decode_bounds(bounds: &[Datum]) -> Result<Vec<Datum>> {
    bounds
        .iter()
        .map(|b| match b.as_bytes() {
            Some(key) => codec::decode_one(key).map(|(value, _)| value),
            None => Ok(b.clone()),
        })
        .collect()
}
