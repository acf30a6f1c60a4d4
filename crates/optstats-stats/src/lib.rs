//! Optimizer statistics: the summaries, their per-column and per-index
//! containers, and the table collections estimators read.
//!
//! - [`Histogram`], [`TopN`], [`CMSketch`], [`FMSketch`]: the summaries.
//! - [`Column`] / [`Index`]: one item's summaries, version and load status.
//! - [`HistColl`] / [`Table`]: a table's items, freshness and health.
//! - [`StatsItem`], [`TableMemoryUsage`], [`NeededItems`]: what a cache
//!   needs to account for, evict and reload items.
//! - [`StatsContext`]: per-statement flags, configuration and traces.

pub mod cmsketch;
pub mod column;
pub mod config;
pub mod context;
pub mod debugtrace;
pub mod estimate;
pub mod fmsketch;
pub mod histcoll;
pub mod histogram;
pub mod index;
pub mod item;
pub mod load_status;
pub mod memory;
pub mod needed;
pub mod table;
pub mod topn;

pub use cmsketch::CMSketch;
pub use column::Column;
pub use config::{DEFAULT_RATIO_OF_PSEUDO_ESTIMATE, StatsConfig, StatsOptions};
pub use context::{CeTraceRecord, StatsContext, TableNameResolver, TraceScope, UsedStatsForTable};
pub use estimate::out_of_range_eq_selectivity;
pub use fmsketch::FMSketch;
pub use histcoll::{AvailableStats, HistColl, StoreKind};
pub use histogram::{Bucket, Histogram};
pub use index::Index;
pub use item::{StatsItem, TableCacheItem};
pub use load_status::{EvictLevel, StatsLoadedStatus};
pub use memory::{ItemMemUsage, TableMemoryUsage};
pub use needed::NeededItems;
pub use table::{
    ExtendedStatsColl, ExtendedStatsItem, ExtendedStatsKind, ExtendedStatsStatus, StatsInfo, Table,
    check_analyze_ver_on_table,
};
pub use topn::{TopN, TopNMeta};
