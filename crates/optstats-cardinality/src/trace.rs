//! Estimation traces written into the statement context.
//!
//! Three kinds of record exist: cardinality-estimation (CE) trace entries that
//! pair a predicate with the row count estimated for it, used-stats entries
//! for items that were not fully loaded, and debug-trace steps. None of them
//! feeds back into an estimate.

use optstats_error::{Result, StatsError};
use optstats_stats::{CeTraceRecord, StatsContext, StatsLoadedStatus, TraceScope};
use optstats_types::{CompareOp, Datum, Expr, ExprColumn, FieldType, Range};
use serde_json::json;
use smallvec::SmallVec;
use tracing::debug;

/// Record the CE trace of a range estimate. The kind gets a `-Point` suffix
/// when every range is a point, `-Range` otherwise. Ranges that render to a
/// constant are not recorded.
pub fn ce_trace_range(
    ctx: &StatsContext,
    table_id: i64,
    col_names: &[String],
    ranges: &[Range],
    kind: &str,
    row_count: u64,
) {
    let all_point = ranges.iter().all(|r| r.is_point_nullable().unwrap_or(false));
    let kind = format!("{kind}-{}", if all_point { "Point" } else { "Range" });
    let expr = match ranges_to_string(ranges, col_names) {
        Ok(expr) => expr,
        Err(err) => {
            debug!(table_id, error = %err, "failed to trace cardinality estimate of ranges");
            String::new()
        }
    };
    if matches!(expr.as_str(), "" | "true" | "false") {
        return;
    }
    ctx.push_ce_trace(CeTraceRecord {
        table_id,
        kind,
        expr,
        row_count,
    });
}

/// Record the CE trace of an expression estimate.
pub fn ce_trace_expr(ctx: &StatsContext, table_id: i64, kind: &str, expr: &Expr, row_count: f64) {
    let expr = match expr.to_trace_string() {
        Ok(expr) => expr,
        Err(err) => {
            debug!(table_id, error = %err, "failed to trace cardinality estimate of expression");
            return;
        }
    };
    ctx.push_ce_trace(CeTraceRecord {
        table_id,
        kind: kind.to_owned(),
        expr,
        row_count: row_count as u64,
    });
}

/// Render ranges as a disjunction of per-range conjunctions in trace syntax,
/// e.g. `` `or`(`eq`(a, 1), `and`(`ge`(a, 3), `lt`(a, 5))) ``.
///
/// Each range contributes equalities for its point prefix and bounds for the
/// first position after it. A range without conditions makes the whole set
/// `true`; an empty set is `false`.
///
/// # Errors
///
/// Fails when a position has no column name or bounds cannot be compared.
pub fn ranges_to_string(ranges: &[Range], col_names: &[String]) -> Result<String> {
    let mut disjuncts = Vec::with_capacity(ranges.len());
    for rg in ranges {
        let eq_len = rg.prefix_equal_len()?;
        let mut conds: SmallVec<[Expr; 4]> = SmallVec::new();
        for (i, low) in rg.low.iter().enumerate() {
            let name = col_names.get(i).ok_or_else(|| {
                StatsError::internal(format!(
                    "range position {i} has no column name, {} given",
                    col_names.len()
                ))
            })?;
            let col = Expr::col(ExprColumn::new(0, 0, name, FieldType::blob()));
            if i < eq_len {
                conds.push(if low.is_null() {
                    Expr::is_null(col)
                } else {
                    Expr::eq(col, Expr::lit(low.clone()))
                });
                continue;
            }
            match low {
                Datum::Null if !rg.low_exclude => {}
                Datum::Null | Datum::MinNotNull => conds.push(Expr::not(Expr::is_null(col.clone()))),
                v => {
                    let op = if rg.low_exclude { CompareOp::Gt } else { CompareOp::Ge };
                    conds.push(Expr::cmp(op, col.clone(), Expr::lit(v.clone())));
                }
            }
            match rg.high.get(i) {
                None | Some(Datum::MaxValue) => {}
                Some(high) => {
                    let op = if rg.high_exclude { CompareOp::Lt } else { CompareOp::Le };
                    conds.push(Expr::cmp(op, col, Expr::lit(high.clone())));
                }
            }
            break;
        }
        match conds.into_iter().reduce(Expr::and) {
            Some(conj) => disjuncts.push(conj),
            None => return Ok("true".to_owned()),
        }
    }
    match disjuncts.into_iter().reduce(Expr::or) {
        Some(dnf) => dnf.to_trace_string(),
        None => Ok("false".to_owned()),
    }
}

/// Note in the statement's used-stats record that an item was missing or
/// only partially loaded. Fully loaded items and non-positive ids are not
/// recorded.
pub fn record_used_item_stats_status(
    ctx: &StatsContext,
    table_id: i64,
    id: i64,
    is_index: bool,
    loaded: Option<StatsLoadedStatus>,
) {
    if id <= 0 {
        return;
    }
    if loaded.is_some_and(|l| l.is_full_load()) {
        return;
    }
    let status = loaded.map_or("missing", |l| l.status_to_string()).to_owned();
    ctx.with_used_stats(table_id, |used| {
        if is_index {
            used.index_status.insert(id, status);
        } else {
            used.column_status.insert(id, status);
        }
    });
}

/// Debug-trace step with the input of a range row count call.
pub fn debug_trace_row_count_input(ctx: &StatsContext, id: i64, ranges: &[Range]) {
    if !ctx.debug_trace_enabled() {
        return;
    }
    let ranges: Vec<String> = ranges.iter().map(ToString::to_string).collect();
    ctx.trace_step(json!({ "ID": id, "Ranges": ranges }));
}

/// Open the debug-trace context of one range of a multi-range estimate.
pub(crate) fn start_estimate_range<'a>(
    ctx: &'a StatsContext,
    range: &Range,
    current_count: f64,
) -> Option<TraceScope<'a>> {
    let scope = ctx.trace_scope("EstimateRange")?;
    ctx.trace_values([("Current Range", json!(range.to_string()))]);
    if current_count > 0.0 {
        ctx.trace_values([("Current Count", json!(current_count))]);
    }
    Some(scope)
}

pub(crate) fn end_estimate_range(ctx: &StatsContext, count: f64) {
    ctx.trace_values([("Count", json!(count))]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_ranges_to_string() {
        let cols = names(&["a", "b"]);
        let point = Range::point([Datum::Int(1), Datum::Int(2)]);
        assert_eq!(
            ranges_to_string(&[point], &cols).unwrap(),
            "`and`(`eq`(a, 1), `eq`(b, 2))"
        );
        let tail = Range::new([Datum::Int(1), Datum::Int(3)], [Datum::Int(1), Datum::MaxValue], true, false);
        let null = Range::point([Datum::Null]);
        assert_eq!(
            ranges_to_string(&[tail, null], &cols).unwrap(),
            "`or`(`and`(`eq`(a, 1), `gt`(b, 3)), `isnull`(a))"
        );
        assert_eq!(ranges_to_string(&[], &cols).unwrap(), "false");
        let full = Range::new([Datum::Null], [Datum::MaxValue], false, false);
        assert_eq!(ranges_to_string(&[full], &cols).unwrap(), "true");
        assert!(ranges_to_string(&[Range::point([Datum::Int(1)])], &[]).is_err());
    }

    #[test]
    fn test_ce_trace_range_kinds() {
        let ctx = StatsContext::default().with_ce_trace(true);
        let cols = names(&["a"]);
        ce_trace_range(&ctx, 3, &cols, &[Range::point([Datum::Int(7)])], "Column Stats", 4);
        ce_trace_range(&ctx, 3, &cols, &[Range::full_not_null()], "Index Stats", 9);
        // Renders to `true`, not recorded.
        let full = Range::new([Datum::Null], [Datum::MaxValue], false, false);
        ce_trace_range(&ctx, 3, &cols, &[full], "Column Stats", 1);
        let trace = ctx.ce_trace();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].kind, "Column Stats-Point");
        assert_eq!(trace[0].expr, "`eq`(a, 7)");
        assert_eq!(trace[1].kind, "Index Stats-Range");
        assert_eq!(trace[1].expr, "`not`(`isnull`(a))");
        assert_eq!(trace[1].row_count, 9);
    }

    #[test]
    fn test_ce_trace_expr_skips_correlated() {
        let ctx = StatsContext::default();
        let col = ExprColumn::new(1, 1, "a", FieldType::bigint());
        ce_trace_expr(&ctx, 1, "Table Stats-Expression-CNF", &Expr::eq(Expr::col(col.clone()), Expr::lit(3_i64)), 2.9);
        let correlated = Expr::Correlated {
            column: col,
            value: Datum::Int(1),
        };
        ce_trace_expr(&ctx, 1, "Table Stats-Expression-CNF", &correlated, 1.0);
        let trace = ctx.ce_trace();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].row_count, 2);
    }

    #[test]
    fn test_record_used_item_stats_status() {
        let ctx = StatsContext::default();
        record_used_item_stats_status(&ctx, 5, 1, false, None);
        record_used_item_stats_status(&ctx, 5, 2, false, Some(StatsLoadedStatus::full_load()));
        record_used_item_stats_status(&ctx, 5, 3, true, Some(StatsLoadedStatus::all_evicted()));
        record_used_item_stats_status(&ctx, 5, 0, true, None);
        let used = ctx.used_stats();
        assert_eq!(used[&5].column_status.len(), 1);
        assert_eq!(used[&5].column_status[&1], "missing");
        assert_eq!(used[&5].index_status[&3], "allEvicted");
        assert!(!used[&5].index_status.contains_key(&0));
    }

    #[test]
    fn test_row_count_input_step() {
        let ctx = StatsContext::default().with_debug_trace(true);
        {
            let _scope = ctx.trace_scope("GetRowCountByColumnRanges");
            debug_trace_row_count_input(&ctx, 4, &[Range::point([Datum::Int(1)])]);
        }
        assert_eq!(
            ctx.debug_trace_json(),
            json!([{ "GetRowCountByColumnRanges": [{ "ID": 4, "Ranges": ["[1,1]"] }] }])
        );
    }
}
