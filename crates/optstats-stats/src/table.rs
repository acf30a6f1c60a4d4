//! Table statistics: a [`HistColl`] plus versioning and extended statistics.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use optstats_types::TableInfo;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cmsketch::CMSketch;
use crate::column::Column;
use crate::config::StatsConfig;
use crate::estimate::PSEUDO_ROW_COUNT;
use crate::fmsketch::FMSketch;
use crate::histcoll::{HistColl, pseudo_hist_coll};
use crate::histogram::Histogram;
use crate::index::Index;
use crate::memory::TableMemoryUsage;
use crate::topn::TopN;

/// What an extended statistics record measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtendedStatsKind {
    Cardinality,
    Dependency,
    Correlation,
}

/// Lifecycle of an extended statistics record in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExtendedStatsStatus {
    /// Registered but not analyzed yet.
    Inited = 0,
    Analyzed = 1,
    /// Dropped; awaiting garbage collection.
    Deleted = 2,
}

impl ExtendedStatsStatus {
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Inited),
            1 => Some(Self::Analyzed),
            2 => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// One cached extended statistics record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedStatsItem {
    pub string_vals: String,
    pub col_ids: Vec<i64>,
    pub scalar_vals: f64,
    pub kind: ExtendedStatsKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtendedStatsColl {
    pub stats: HashMap<String, Arc<ExtendedStatsItem>>,
    pub last_update_version: u64,
}

impl ExtendedStatsColl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Copies of one item's summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsInfo {
    pub histogram: Histogram,
    pub cm_sketch: Option<CMSketch>,
    pub top_n: Option<TopN>,
    pub fm_sketch: Option<FMSketch>,
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub coll: HistColl,
    pub extended_stats: Option<ExtendedStatsColl>,
    pub name: String,
    pub version: u64,
    /// Schema version of the table definition these statistics were
    /// loaded against.
    pub tbl_info_update_ts: u64,
}

impl Table {
    #[must_use]
    pub fn new(coll: HistColl) -> Self {
        Self {
            coll,
            ..Self::default()
        }
    }

    /// Pseudo statistics for a table that was never analyzed.
    #[must_use]
    pub fn pseudo(info: &TableInfo) -> Self {
        Self::new(pseudo_hist_coll(info, PSEUDO_ROW_COUNT))
    }

    /// Shallow copy: the maps are new, the column, index and extended
    /// statistics they hold are shared.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// The statistics estimation should use: a pseudo copy when the table
    /// changed too much since analyze.
    #[must_use]
    pub fn for_estimation(&self, config: &StatsConfig) -> Self {
        if !self.coll.is_outdated(config) {
            return self.copy();
        }
        debug!(
            table_id = self.coll.physical_id,
            realtime_count = self.coll.realtime_count,
            modify_count = self.coll.modify_count,
            ratio = config.ratio_of_pseudo_estimate(),
            "statistics outdated, estimating with pseudo statistics"
        );
        let mut coll = self.coll.clone();
        coll.pseudo = true;
        Self {
            coll,
            name: self.name.clone(),
            version: self.version,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn memory_usage(&self) -> TableMemoryUsage {
        self.coll.memory_usage()
    }

    /// First index, by id, whose leading column is `col_name`.
    #[must_use]
    pub fn index_start_with_column(&self, col_name: &str) -> Option<&Arc<Index>> {
        self.coll
            .sorted_index_ids()
            .into_iter()
            .filter_map(|id| self.coll.indices.get(&id))
            .find(|idx| idx.info.columns.first().is_some_and(|c| c.name == col_name))
    }

    #[must_use]
    pub fn column_by_name(&self, col_name: &str) -> Option<&Arc<Column>> {
        self.coll.columns.values().find(|c| c.info.name == col_name)
    }

    /// Copies of the summaries of a column or index, `None` when the item
    /// has no statistics yet.
    #[must_use]
    pub fn stats_info(&self, id: i64, is_index: bool) -> Option<StatsInfo> {
        if is_index {
            return self.coll.indices.get(&id).map(|i| StatsInfo {
                histogram: i.histogram.clone(),
                cm_sketch: i.cm_sketch.clone(),
                top_n: i.top_n.clone(),
                fm_sketch: i.fm_sketch.clone(),
            });
        }
        self.coll.columns.get(&id).map(|c| StatsInfo {
            histogram: c.histogram.clone(),
            cm_sketch: c.cm_sketch.clone(),
            top_n: c.top_n.clone(),
            fm_sketch: c.fm_sketch.clone(),
        })
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Table:{} RealtimeCount:{}",
            self.coll.physical_id, self.coll.realtime_count
        )?;
        for id in self.coll.sorted_column_ids() {
            if let Some(col) = self.coll.columns.get(&id) {
                write!(f, "\n{col}")?;
            }
        }
        for id in self.coll.sorted_index_ids() {
            if let Some(idx) = self.coll.indices.get(&id) {
                write!(f, "\n{idx}")?;
            }
        }
        Ok(())
    }
}

/// Whether every analyzed item of `table` uses `version`. On a mismatch
/// `version` takes the table's and the result is false.
///
/// Columns are checked before indexes, each by ascending id; the first
/// analyzed item decides.
pub fn check_analyze_ver_on_table(table: &Table, version: &mut i64) -> bool {
    let coll = &table.coll;
    let first_col = coll
        .sorted_column_ids()
        .into_iter()
        .filter_map(|id| coll.columns.get(&id))
        .find(|c| c.is_analyzed())
        .map(|c| c.stats_ver);
    let first = first_col.or_else(|| {
        coll.sorted_index_ids()
            .into_iter()
            .filter_map(|id| coll.indices.get(&id))
            .find(|i| i.is_analyzed())
            .map(|i| i.stats_ver)
    });
    match first {
        Some(ver) if ver != *version => {
            *version = ver;
            false
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatsOptions;
    use crate::estimate::{VERSION1, VERSION2};
    use optstats_types::{ColumnInfo, Datum, FieldType, IndexColumn, IndexInfo};

    fn column(id: i64, name: &str) -> Column {
        let mut h = Histogram::new(id, 4, 0, 1, FieldType::bigint(), 1, 32);
        h.append_bucket(Datum::Int(1), Datum::Int(4), 4, 1);
        Column::new(5, ColumnInfo::new(id, name, FieldType::bigint()), h)
    }

    fn index(id: i64, leading: &str) -> Index {
        let info = IndexInfo::new(id, &format!("idx{id}"), vec![IndexColumn::new(leading, 0)]);
        Index::new(5, info, Histogram::new(id, 0, 0, 1, FieldType::blob(), 0, 0))
    }

    fn table() -> Table {
        Table::new(
            HistColl::new(5, 4, 0)
                .with_column(column(2, "b"))
                .with_column(column(1, "a"))
                .with_index(index(8, "b"))
                .with_index(index(7, "b")),
        )
    }

    #[test]
    fn test_display_orders_by_id() {
        let text = table().to_string();
        assert!(text.starts_with("Table:5 RealtimeCount:4\ncolumn:1 "));
        let col2 = text.find("column:2").unwrap();
        let idx7 = text.find("index:7").unwrap();
        let idx8 = text.find("index:8").unwrap();
        assert!(col2 < idx7 && idx7 < idx8);
    }

    #[test]
    fn test_lookups() {
        let t = table();
        assert_eq!(t.index_start_with_column("b").map(|i| i.id()), Some(7));
        assert!(t.index_start_with_column("a").is_none());
        assert_eq!(t.column_by_name("a").map(|c| c.id()), Some(1));
        let info = t.stats_info(1, false).unwrap();
        assert_eq!(info.histogram.len(), 1);
        assert!(t.stats_info(1, true).is_none());
    }

    #[test]
    fn test_copy_shares_items() {
        let t = table();
        let c = t.copy();
        assert!(Arc::ptr_eq(&t.coll.columns[&1], &c.coll.columns[&1]));
    }

    #[test]
    fn test_for_estimation_goes_pseudo_when_outdated() {
        let config = StatsConfig::new(StatsOptions::default());
        let mut t = table();
        assert!(!t.for_estimation(&config).coll.pseudo);
        t.coll.modify_count = 3;
        let est = t.for_estimation(&config);
        assert!(est.coll.pseudo);
        assert_eq!(est.coll.columns.len(), 2);
    }

    #[test]
    fn test_check_analyze_ver() {
        let mut t = table();
        let mut ver = VERSION2;
        assert!(check_analyze_ver_on_table(&t, &mut ver));
        let col = Arc::make_mut(t.coll.columns.get_mut(&1).unwrap());
        col.stats_ver = VERSION1;
        assert!(!check_analyze_ver_on_table(&t, &mut ver));
        assert_eq!(ver, VERSION1);
        assert!(check_analyze_ver_on_table(&Table::default(), &mut ver));
    }

    #[test]
    fn test_pseudo_table() {
        let info = TableInfo::new(9, "t").with_column(ColumnInfo::new(1, "a", FieldType::bigint()));
        let t = Table::pseudo(&info);
        assert!(t.coll.pseudo);
        assert_eq!(t.coll.realtime_count, PSEUDO_ROW_COUNT);
        assert_eq!(t.coll.physical_id, 9);
        assert_eq!(t.coll.columns[&1].physical_id, -1);
    }
}
