//! Per-statement estimation context.
//!
//! Carries the session flags estimation reads, the shared configuration and
//! pending-load tracker, and the statement's trace buffers. The buffers are
//! written by estimation but never read back by it, so tracing cannot change
//! a result.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::config::StatsConfig;
use crate::debugtrace::DebugTrace;
use crate::needed::NeededItems;

/// One cardinality-estimation trace entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CeTraceRecord {
    pub table_id: i64,
    /// Source of the estimate, e.g. `Index Stats-Point`.
    #[serde(rename = "type")]
    pub kind: String,
    pub expr: String,
    pub row_count: u64,
}

/// Load status of the statistics a statement used on one table, recorded
/// only for items that were not fully loaded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UsedStatsForTable {
    pub name: String,
    pub column_status: BTreeMap<i64, String>,
    pub index_status: BTreeMap<i64, String>,
}

/// Maps a physical table id to the name recorded in used-stats entries.
pub type TableNameResolver = Arc<dyn Fn(i64) -> String + Send + Sync>;

pub struct StatsContext {
    config: Arc<StatsConfig>,
    needed: Arc<NeededItems>,
    debug_trace_enabled: bool,
    ce_trace_enabled: bool,
    chunk_rpc: bool,
    new_collation: bool,
    table_names: Option<TableNameResolver>,
    debug_trace: Mutex<DebugTrace>,
    ce_trace: Mutex<Vec<CeTraceRecord>>,
    used_stats: Mutex<BTreeMap<i64, UsedStatsForTable>>,
}

impl StatsContext {
    /// Context with tracing off, chunk RPC off and new collations on.
    #[must_use]
    pub fn new(config: Arc<StatsConfig>, needed: Arc<NeededItems>) -> Self {
        Self {
            config,
            needed,
            debug_trace_enabled: false,
            ce_trace_enabled: false,
            chunk_rpc: false,
            new_collation: true,
            table_names: None,
            debug_trace: Mutex::new(DebugTrace::new()),
            ce_trace: Mutex::new(Vec::new()),
            used_stats: Mutex::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn with_debug_trace(mut self, enabled: bool) -> Self {
        self.debug_trace_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_ce_trace(mut self, enabled: bool) -> Self {
        self.ce_trace_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_chunk_rpc(mut self, enabled: bool) -> Self {
        self.chunk_rpc = enabled;
        self
    }

    #[must_use]
    pub fn with_new_collation(mut self, enabled: bool) -> Self {
        self.new_collation = enabled;
        self
    }

    #[must_use]
    pub fn with_table_names(mut self, resolver: TableNameResolver) -> Self {
        self.table_names = Some(resolver);
        self
    }

    #[must_use]
    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    #[must_use]
    pub fn needed_items(&self) -> &NeededItems {
        &self.needed
    }

    #[must_use]
    pub const fn debug_trace_enabled(&self) -> bool {
        self.debug_trace_enabled
    }

    #[must_use]
    pub const fn ce_trace_enabled(&self) -> bool {
        self.ce_trace_enabled
    }

    #[must_use]
    pub const fn chunk_rpc_enabled(&self) -> bool {
        self.chunk_rpc
    }

    #[must_use]
    pub const fn new_collation_enabled(&self) -> bool {
        self.new_collation
    }

    /// Open a debug-trace context that closes when the guard drops. `None`
    /// when debug tracing is off.
    #[must_use]
    pub fn trace_scope(&self, name: &str) -> Option<TraceScope<'_>> {
        if !self.debug_trace_enabled {
            return None;
        }
        self.debug_trace.lock().enter(name);
        Some(TraceScope { ctx: self })
    }

    /// Record named values in the current debug-trace context.
    pub fn trace_values(&self, values: impl IntoIterator<Item = (&'static str, Value)>) {
        if self.debug_trace_enabled {
            self.debug_trace.lock().record_values(values);
        }
    }

    /// Append a raw step to the current debug-trace context.
    pub fn trace_step(&self, step: Value) {
        if self.debug_trace_enabled {
            self.debug_trace.lock().append_step(step);
        }
    }

    #[must_use]
    pub fn debug_trace_json(&self) -> Value {
        self.debug_trace.lock().to_json()
    }

    pub fn push_ce_trace(&self, record: CeTraceRecord) {
        self.ce_trace.lock().push(record);
    }

    #[must_use]
    pub fn ce_trace(&self) -> Vec<CeTraceRecord> {
        self.ce_trace.lock().clone()
    }

    /// Run `f` on the used-stats entry of `table_id`, creating it first.
    pub fn with_used_stats<T>(&self, table_id: i64, f: impl FnOnce(&mut UsedStatsForTable) -> T) -> T {
        let mut used = self.used_stats.lock();
        let entry = used.entry(table_id).or_insert_with(|| UsedStatsForTable {
            name: self
                .table_names
                .as_ref()
                .map_or_else(|| table_id.to_string(), |resolve| resolve(table_id)),
            ..UsedStatsForTable::default()
        });
        f(entry)
    }

    #[must_use]
    pub fn used_stats(&self) -> BTreeMap<i64, UsedStatsForTable> {
        self.used_stats.lock().clone()
    }
}

impl Default for StatsContext {
    fn default() -> Self {
        Self::new(Arc::default(), Arc::default())
    }
}

impl fmt::Debug for StatsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsContext")
            .field("config", &self.config)
            .field("debug_trace_enabled", &self.debug_trace_enabled)
            .field("ce_trace_enabled", &self.ce_trace_enabled)
            .field("chunk_rpc", &self.chunk_rpc)
            .field("new_collation", &self.new_collation)
            .finish_non_exhaustive()
    }
}

/// Closes a debug-trace context on drop.
#[derive(Debug)]
pub struct TraceScope<'a> {
    ctx: &'a StatsContext,
}

impl Drop for TraceScope<'_> {
    fn drop(&mut self) {
        self.ctx.debug_trace.lock().leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trace_scope_is_inert_when_disabled() {
        let ctx = StatsContext::default();
        assert!(ctx.trace_scope("x").is_none());
        ctx.trace_values([("a", json!(1))]);
        assert_eq!(ctx.debug_trace_json(), json!([]));
    }

    #[test]
    fn test_trace_scope_nests() {
        let ctx = StatsContext::default().with_debug_trace(true);
        {
            let _outer = ctx.trace_scope("outer");
            ctx.trace_values([("Result", json!(2))]);
        }
        assert_eq!(ctx.debug_trace_json(), json!([{ "outer": [{ "Result": 2 }] }]));
    }

    #[test]
    fn test_used_stats_uses_resolver() {
        let ctx = StatsContext::default().with_table_names(Arc::new(|id| format!("test.t{id}")));
        ctx.with_used_stats(5, |t| t.column_status.insert(1, "allEvicted".to_owned()));
        let used = ctx.used_stats();
        assert_eq!(used[&5].name, "test.t5");
        assert_eq!(used[&5].column_status[&1], "allEvicted");
    }
}
