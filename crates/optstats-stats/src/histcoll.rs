//! A table's column and index statistics with the maps estimation walks.

use std::collections::HashMap;
use std::sync::Arc;

use optstats_types::{ExprColumn, FieldType, SchemaState, TableInfo};
use serde_json::json;

use crate::column::Column;
use crate::config::StatsConfig;
use crate::context::StatsContext;
use crate::estimate::{PSEUDO_COL_SIZE, PSEUDO_EQUAL_RATE, VERSION0};
use crate::histogram::Histogram;
use crate::index::Index;
use crate::load_status::StatsLoadedStatus;
use crate::memory::TableMemoryUsage;

/// Length of a row key: table prefix, table id, record prefix and handle.
pub const RECORD_ROW_KEY_LEN: f64 = 19.0;
/// Index key overhead: table prefix, table id, index prefix and index id.
const INDEX_KEY_PREFIX_LEN: f64 = 19.0;

/// Where a table scan reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Row-oriented key-value store.
    RowStore,
    /// Columnar replica.
    ColumnStore,
}

/// Statistics usable for a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvailableStats {
    Column(i64),
    /// A full-width single-column index on the column.
    Index(i64),
}

/// Column and index statistics of one table.
///
/// Column keys are schema column ids for a stored collection, and plan
/// unique ids for a collection derived with [`HistColl::from_column_info`]
/// or [`HistColl::id_to_unique_id`].
#[derive(Debug, Clone, Default)]
pub struct HistColl {
    pub physical_id: i64,
    pub columns: HashMap<i64, Arc<Column>>,
    pub indices: HashMap<i64, Arc<Index>>,
    /// Index id to the ids of its columns, in index order.
    pub idx_to_column_ids: HashMap<i64, Vec<i64>>,
    /// Column id to the ids of the indexes it leads, ascending.
    pub col_id_to_idx_ids: HashMap<i64, Vec<i64>>,
    /// Current row count, analyze-time count plus applied deltas.
    pub realtime_count: i64,
    /// Rows modified since analyze.
    pub modify_count: i64,
    /// Built for one physical table, so `physical_id` can locate statistics
    /// in storage.
    pub have_physical_id: bool,
    pub pseudo: bool,
}

impl HistColl {
    #[must_use]
    pub fn new(physical_id: i64, realtime_count: i64, modify_count: i64) -> Self {
        Self {
            physical_id,
            realtime_count,
            modify_count,
            have_physical_id: true,
            ..Self::default()
        }
    }

    /// Add column statistics keyed by the column id.
    #[must_use]
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.insert(column.id(), Arc::new(column));
        self
    }

    /// Add index statistics keyed by the index id.
    #[must_use]
    pub fn with_index(mut self, index: Index) -> Self {
        self.indices.insert(index.id(), Arc::new(index));
        self
    }

    /// Record the columns of an index in both lookup maps.
    #[must_use]
    pub fn with_index_columns(mut self, index_id: i64, column_ids: Vec<i64>) -> Self {
        self.set_index_columns(index_id, column_ids);
        self
    }

    pub fn set_index_columns(&mut self, index_id: i64, column_ids: Vec<i64>) {
        if let Some(&first) = column_ids.first() {
            let leading = self.col_id_to_idx_ids.entry(first).or_default();
            if let Err(pos) = leading.binary_search(&index_id) {
                leading.insert(pos, index_id);
            }
        }
        self.idx_to_column_ids.insert(index_id, column_ids);
    }

    #[must_use]
    pub fn column(&self, id: i64) -> Option<&Arc<Column>> {
        self.columns.get(&id)
    }

    #[must_use]
    pub fn index(&self, id: i64) -> Option<&Arc<Index>> {
        self.indices.get(&id)
    }

    pub(crate) fn sorted_column_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.columns.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn sorted_index_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.indices.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Analyze-time row count of the lowest-id fully loaded column. Unlike
    /// `realtime_count` it ignores modifications.
    #[must_use]
    pub fn col_row_count(&self) -> Option<f64> {
        self.sorted_column_ids()
            .into_iter()
            .filter_map(|id| self.columns.get(&id))
            .find(|c| c.loaded.is_full_load())
            .map(|c| c.total_row_count())
    }

    /// Percentage of rows unchanged since analyze, `None` for pseudo
    /// statistics.
    #[must_use]
    pub fn stats_healthy(&self) -> Option<i64> {
        if self.pseudo {
            return None;
        }
        let count = match self.col_row_count() {
            Some(hist_count) if hist_count > 0.0 => hist_count,
            _ => self.realtime_count as f64,
        };
        let modify = self.modify_count as f64;
        let healthy = if modify < count {
            ((1.0 - modify / count) * 100.0) as i64
        } else if self.modify_count == 0 {
            100
        } else {
            0
        };
        Some(healthy)
    }

    /// Whether so many rows changed since analyze that estimates should use
    /// pseudo statistics. Reads the live threshold on every call.
    #[must_use]
    pub fn is_outdated(&self, config: &StatsConfig) -> bool {
        let row_count = self
            .col_row_count()
            .unwrap_or(self.realtime_count as f64);
        row_count > 0.0 && self.modify_count as f64 / row_count > config.ratio_of_pseudo_estimate()
    }

    /// Whether any column or index has collected statistics.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.columns.values().any(|c| c.loaded.is_stats_initialized())
            || self.indices.values().any(|i| i.loaded.is_stats_initialized())
    }

    #[must_use]
    pub fn pseudo_avg_count_per_value(&self) -> f64 {
        self.realtime_count as f64 / PSEUDO_EQUAL_RATE
    }

    #[must_use]
    pub fn memory_usage(&self) -> TableMemoryUsage {
        let mut usage = TableMemoryUsage::new(self.physical_id);
        for column in self.columns.values() {
            usage.add_column(column.memory_usage());
        }
        for index in self.indices.values() {
            usage.add_index(index.memory_usage());
        }
        usage
    }

    /// Collection keyed by the plan unique ids of `columns`. Indexes are not
    /// carried over.
    #[must_use]
    pub fn id_to_unique_id(&self, columns: &[ExprColumn]) -> Self {
        let cols = columns
            .iter()
            .filter_map(|c| self.columns.get(&c.id).map(|s| (c.unique_id, Arc::clone(s))))
            .collect();
        Self {
            physical_id: self.physical_id,
            columns: cols,
            realtime_count: self.realtime_count,
            modify_count: self.modify_count,
            have_physical_id: self.have_physical_id,
            pseudo: self.pseudo,
            ..Self::default()
        }
    }

    /// Collection keyed by the plan unique ids of `columns`, with index
    /// column maps rebuilt from the schema.
    ///
    /// An index keeps the leading columns present in `columns`; an index
    /// whose first column is absent is dropped.
    #[must_use]
    pub fn from_column_info(&self, table: &TableInfo, columns: &[ExprColumn]) -> Self {
        let unique_ids: HashMap<i64, i64> = columns.iter().map(|c| (c.id, c.unique_id)).collect();
        let cols = self
            .columns
            .iter()
            .filter_map(|(id, stats)| unique_ids.get(id).map(|uid| (*uid, Arc::clone(stats))))
            .collect();
        let mut out = Self {
            physical_id: self.physical_id,
            columns: cols,
            realtime_count: self.realtime_count,
            modify_count: self.modify_count,
            have_physical_id: self.have_physical_id,
            pseudo: self.pseudo,
            ..Self::default()
        };
        for (id, stats) in &self.indices {
            let Some(info) = table.indices.iter().find(|i| i.id == *id) else {
                continue;
            };
            let ids: Vec<i64> = info
                .columns
                .iter()
                .map_while(|ic| {
                    table
                        .columns
                        .get(ic.offset)
                        .and_then(|col| unique_ids.get(&col.id).copied())
                })
                .collect();
            if ids.is_empty() {
                continue;
            }
            out.indices.insert(*id, Arc::clone(stats));
            out.set_index_columns(*id, ids);
        }
        out
    }

    /// Statistics to estimate a predicate on the column with `unique_id`:
    /// its own if valid and fully loaded, else a valid fully loaded
    /// single-column index that stores the whole value.
    pub fn find_available_stats_for_col(&self, ctx: &StatsContext, unique_id: i64) -> Option<AvailableStats> {
        if let Some(col) = self.columns.get(&unique_id) {
            if !col.is_invalid(ctx, self.pseudo) && col.loaded.is_full_load() {
                return Some(AvailableStats::Column(unique_id));
            }
        }
        let mut idx_ids: Vec<i64> = self
            .idx_to_column_ids
            .iter()
            .filter(|(_, cols)| cols.as_slice() == [unique_id])
            .map(|(id, _)| *id)
            .collect();
        idx_ids.sort_unstable();
        idx_ids.into_iter().find_map(|id| {
            let idx = self.indices.get(&id)?;
            let usable = idx.info.is_full_first_column()
                && !idx.is_invalid(ctx, self.pseudo)
                && idx.loaded.is_full_load();
            usable.then_some(AvailableStats::Index(id))
        })
    }

    /// Average width of a row made of `columns`.
    ///
    /// Each column contributes its average size in key or value encoding, or
    /// in the chunk format when chunk RPC is on and this is not a scan, plus
    /// one flag byte (a null-bitmap bit in the chunk format).
    pub fn avg_row_size(
        &self,
        ctx: &StatsContext,
        columns: &[ExprColumn],
        is_encoded_key: bool,
        is_for_scan: bool,
    ) -> f64 {
        let chunk_format = ctx.chunk_rpc_enabled() && !is_for_scan;
        let mut size = 0.0;
        if self.pseudo || self.columns.is_empty() || self.realtime_count == 0 {
            size = PSEUDO_COL_SIZE * columns.len() as f64;
        } else {
            for col in columns {
                let Some(stats) = self.usable_size_stats(col.unique_id) else {
                    size += PSEUDO_COL_SIZE;
                    continue;
                };
                size += if chunk_format {
                    stats.avg_col_size_chunk_format(self.realtime_count)
                } else {
                    stats.avg_col_size(self.realtime_count, is_encoded_key)
                };
            }
        }
        ctx.trace_values([("AvgRowSize", json!(size)), ("Columns", json!(columns.len()))]);
        if chunk_format {
            return size + columns.len() as f64 / 8.0;
        }
        size + columns.len() as f64
    }

    /// Average width of a row spilled to disk, with an 8-byte size record
    /// per column.
    #[must_use]
    pub fn avg_row_size_list_in_disk(&self, columns: &[ExprColumn]) -> f64 {
        let use_pseudo = self.pseudo || self.columns.is_empty() || self.realtime_count == 0;
        let size: f64 = columns
            .iter()
            .map(|col| {
                let stats = if use_pseudo {
                    None
                } else {
                    self.usable_size_stats(col.unique_id)
                };
                stats.map_or_else(
                    || col.ret_type.estimate_width() as f64,
                    |s| s.avg_col_size_list_in_disk(self.realtime_count),
                )
            })
            .sum();
        size + 8.0 * columns.len() as f64
    }

    /// Average row width of a table scan, excluding index entries.
    pub fn table_avg_row_size(
        &self,
        ctx: &StatsContext,
        columns: &[ExprColumn],
        store: StoreKind,
        handle_in_cols: bool,
    ) -> f64 {
        let mut size = self.avg_row_size(ctx, columns, false, true);
        match store {
            // The scanned columns always contain the handle, which the row
            // key already holds.
            StoreKind::RowStore => size += RECORD_ROW_KEY_LEN - 8.0,
            StoreKind::ColumnStore => {
                if !handle_in_cols {
                    size += 8.0;
                }
            }
        }
        size
    }

    /// Average row width of an index scan.
    pub fn index_avg_row_size(&self, ctx: &StatsContext, columns: &[ExprColumn], is_unique: bool) -> f64 {
        let mut size = self.avg_row_size(ctx, columns, true, true) + INDEX_KEY_PREFIX_LEN;
        if !is_unique {
            // The `_` separating a non-unique key from its handle.
            size += 1.0;
        }
        size
    }

    /// Column statistics that know their encoded size. Old statistics
    /// without a size total are skipped unless every row is NULL.
    fn usable_size_stats(&self, unique_id: i64) -> Option<&Arc<Column>> {
        self.columns.get(&unique_id).filter(|c| {
            c.is_handle || c.histogram.tot_col_size != 0 || c.histogram.null_count == self.realtime_count
        })
    }
}

/// Pseudo statistics for a table that was never analyzed: every public
/// column and index gets an empty histogram.
#[must_use]
pub(crate) fn pseudo_hist_coll(table: &TableInfo, realtime_count: i64) -> HistColl {
    const FAKE_PHYSICAL_ID: i64 = -1;

    let mut coll = HistColl {
        physical_id: table.id,
        realtime_count,
        have_physical_id: true,
        pseudo: true,
        ..HistColl::default()
    };
    for col in &table.columns {
        // Hidden columns back expression indexes and carry no statistics.
        if col.state != SchemaState::Public || col.hidden {
            continue;
        }
        let mut stats = Column::new(
            FAKE_PHYSICAL_ID,
            col.clone(),
            Histogram::new(col.id, 0, 0, 0, col.field_type.clone(), 0, 0),
        )
        .with_stats_ver(VERSION0)
        .with_loaded(StatsLoadedStatus::uninitialized());
        stats.is_handle = table.pk_is_handle && col.field_type.primary_key;
        coll.columns.insert(col.id, Arc::new(stats));
    }
    for idx in &table.indices {
        if idx.state != SchemaState::Public {
            continue;
        }
        let stats = Index::new(
            FAKE_PHYSICAL_ID,
            idx.clone(),
            Histogram::new(idx.id, 0, 0, 0, FieldType::blob(), 0, 0),
        )
        .with_stats_ver(VERSION0)
        .with_loaded(StatsLoadedStatus::uninitialized());
        coll.indices.insert(idx.id, Arc::new(stats));
        let column_ids: Vec<i64> = idx
            .columns
            .iter()
            .map_while(|ic| table.columns.get(ic.offset).map(|c| c.id))
            .collect();
        coll.set_index_columns(idx.id, column_ids);
    }
    coll
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatsOptions;
    use optstats_types::{ColumnInfo, Datum, IndexColumn, IndexInfo};

    fn int_column(id: i64, rows: i64) -> Column {
        let mut h = Histogram::new(id, rows, 0, 1, FieldType::bigint(), 1, rows * 8);
        h.append_bucket(Datum::Int(1), Datum::Int(rows), rows, 1);
        Column::new(1, ColumnInfo::new(id, &format!("c{id}"), FieldType::bigint()), h)
    }

    fn table_info() -> TableInfo {
        TableInfo::new(1, "t")
            .with_column(ColumnInfo::new(1, "a", FieldType::bigint()))
            .with_column(ColumnInfo::new(2, "b", FieldType::bigint()))
            .with_column(ColumnInfo::new(3, "c", FieldType::bigint()))
            .with_index(IndexInfo::new(10, "ab", vec![IndexColumn::new("a", 0), IndexColumn::new("b", 1)]))
            .with_index(IndexInfo::new(11, "b", vec![IndexColumn::new("b", 1)]))
            .with_index(IndexInfo::new(12, "c", vec![IndexColumn::new("c", 2)]))
    }

    fn empty_index(info: &IndexInfo) -> Index {
        let mut h = Histogram::new(info.id, 1, 0, 1, FieldType::blob(), 1, 0);
        h.append_bucket(Datum::Bytes(vec![3]), Datum::Bytes(vec![4]), 5, 1);
        Index::new(1, info.clone(), h)
    }

    #[test]
    fn test_col_row_count_skips_partial_columns() {
        let coll = HistColl::new(1, 100, 0)
            .with_column(int_column(1, 40).with_loaded(StatsLoadedStatus::all_evicted()))
            .with_column(int_column(2, 50));
        assert_eq!(coll.col_row_count(), Some(50.0));
        assert_eq!(HistColl::new(1, 100, 0).col_row_count(), None);
    }

    #[test]
    fn test_stats_healthy() {
        let mut coll = HistColl::new(1, 100, 0).with_column(int_column(1, 50));
        assert_eq!(coll.stats_healthy(), Some(100));
        coll.modify_count = 25;
        assert_eq!(coll.stats_healthy(), Some(50));
        coll.modify_count = 60;
        assert_eq!(coll.stats_healthy(), Some(0));
        coll.pseudo = true;
        assert_eq!(coll.stats_healthy(), None);
    }

    #[test]
    fn test_is_outdated_reads_live_threshold() {
        let config = StatsConfig::new(StatsOptions::default());
        let mut coll = HistColl::new(1, 100, 70);
        assert!(!coll.is_outdated(&config));
        coll.modify_count = 71;
        assert!(coll.is_outdated(&config));
        config.set_ratio_of_pseudo_estimate(0.8);
        assert!(!coll.is_outdated(&config));
        assert!(!HistColl::new(1, 0, 5).is_outdated(&config));
    }

    #[test]
    fn test_from_column_info_rebuilds_index_maps() {
        let info = table_info();
        let mut coll = HistColl::new(1, 100, 0)
            .with_column(int_column(1, 100))
            .with_column(int_column(2, 100))
            .with_column(int_column(3, 100));
        for idx in &info.indices {
            coll = coll.with_index(empty_index(idx));
        }
        let cols = [
            ExprColumn::new(1, 101, "a", FieldType::bigint()),
            ExprColumn::new(2, 102, "b", FieldType::bigint()),
        ];
        let derived = coll.from_column_info(&info, &cols);
        let mut col_keys: Vec<i64> = derived.columns.keys().copied().collect();
        col_keys.sort_unstable();
        assert_eq!(col_keys, vec![101, 102]);
        assert_eq!(derived.idx_to_column_ids[&10], vec![101, 102]);
        assert_eq!(derived.idx_to_column_ids[&11], vec![102]);
        assert!(!derived.indices.contains_key(&12));
        assert_eq!(derived.col_id_to_idx_ids[&101], vec![10]);
        assert_eq!(derived.col_id_to_idx_ids[&102], vec![11]);
        assert!(Arc::ptr_eq(&derived.columns[&101], &coll.columns[&1]));

        let plain = coll.id_to_unique_id(&cols);
        assert_eq!(plain.columns.len(), 2);
        assert!(plain.indices.is_empty());
    }

    #[test]
    fn test_find_available_stats_falls_back_to_index() {
        let ctx = StatsContext::default();
        let info = table_info();
        let coll = HistColl::new(1, 100, 0)
            .with_column(int_column(2, 100).with_loaded(StatsLoadedStatus::all_evicted()))
            .with_index(empty_index(&info.indices[1]))
            .with_index_columns(11, vec![2]);
        assert_eq!(coll.find_available_stats_for_col(&ctx, 2), Some(AvailableStats::Index(11)));
        assert_eq!(coll.find_available_stats_for_col(&ctx, 3), None);
    }

    #[test]
    fn test_avg_row_size() {
        let ctx = StatsContext::default();
        let cols = [ExprColumn::new(1, 1, "a", FieldType::bigint())];
        let coll = HistColl::new(1, 100, 0).with_column(int_column(1, 100));
        // Value encoding: 800 / 100 bytes plus the flag byte.
        assert_eq!(coll.avg_row_size(&ctx, &cols, false, true), 9.0);
        // Key encoding, 19 bytes of key prefix and the `_` separator.
        assert_eq!(coll.index_avg_row_size(&ctx, &cols, false), 29.0);
        assert_eq!(coll.table_avg_row_size(&ctx, &cols, StoreKind::RowStore, true), 9.0 + 11.0);
        assert_eq!(coll.table_avg_row_size(&ctx, &cols, StoreKind::ColumnStore, false), 17.0);

        let chunk = StatsContext::default().with_chunk_rpc(true);
        assert_eq!(coll.avg_row_size(&chunk, &cols, false, false), 8.0 + 0.125);
        assert_eq!(coll.avg_row_size_list_in_disk(&cols), 16.0);

        let pseudo = HistColl::new(1, 0, 0);
        assert_eq!(pseudo.avg_row_size(&ctx, &cols, false, true), 9.0);
    }

    #[test]
    fn test_pseudo_collection() {
        let mut info = table_info().with_pk_is_handle();
        info.columns[0].field_type = FieldType::bigint().with_primary_key();
        info.columns[2].hidden = true;
        let coll = pseudo_hist_coll(&info, 10000);
        assert!(coll.pseudo && coll.have_physical_id);
        assert_eq!(coll.physical_id, 1);
        assert_eq!(coll.columns.len(), 2);
        assert!(coll.columns[&1].is_handle);
        assert!(!coll.columns[&2].is_handle);
        assert_eq!(coll.indices.len(), 3);
        assert_eq!(coll.idx_to_column_ids[&10], vec![1, 2]);
        assert!(!coll.is_initialized());
        assert_eq!(coll.stats_healthy(), None);
        assert_eq!(coll.pseudo_avg_count_per_value(), 10.0);
    }
}
