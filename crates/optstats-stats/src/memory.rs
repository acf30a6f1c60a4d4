//! Memory accounting for cached statistics.

use std::collections::HashMap;

use serde::Serialize;

/// Memory held by one column or index, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ItemMemUsage {
    pub item_id: i64,
    pub histogram: i64,
    pub cm_sketch: i64,
    pub fm_sketch: i64,
    pub top_n: i64,
    pub total: i64,
}

impl ItemMemUsage {
    /// Fill `total` from the parts.
    #[must_use]
    pub const fn new(item_id: i64, histogram: i64, cm_sketch: i64, fm_sketch: i64, top_n: i64) -> Self {
        Self {
            item_id,
            histogram,
            cm_sketch,
            fm_sketch,
            top_n,
            total: histogram + cm_sketch + fm_sketch + top_n,
        }
    }

    /// Bytes the cache may reclaim by evicting this item. The FM sketch is
    /// not counted.
    #[must_use]
    pub const fn tracking(&self) -> i64 {
        self.cm_sketch + self.top_n + self.histogram
    }
}

/// Memory held by one table's statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TableMemoryUsage {
    pub table_id: i64,
    pub columns: HashMap<i64, ItemMemUsage>,
    pub indices: HashMap<i64, ItemMemUsage>,
    pub total: i64,
}

impl TableMemoryUsage {
    #[must_use]
    pub fn new(table_id: i64) -> Self {
        Self {
            table_id,
            ..Self::default()
        }
    }

    pub fn add_column(&mut self, usage: ItemMemUsage) {
        self.total += usage.total;
        self.columns.insert(usage.item_id, usage);
    }

    pub fn add_index(&mut self, usage: ItemMemUsage) {
        self.total += usage.total;
        self.indices.insert(usage.item_id, usage);
    }

    #[must_use]
    pub fn total_col_tracking(&self) -> i64 {
        self.columns.values().map(ItemMemUsage::tracking).sum()
    }

    #[must_use]
    pub fn total_idx_tracking(&self) -> i64 {
        self.indices.values().map(ItemMemUsage::tracking).sum()
    }

    #[must_use]
    pub fn total_tracking(&self) -> i64 {
        self.total_col_tracking() + self.total_idx_tracking()
    }
}
