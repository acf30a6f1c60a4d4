//! The cacheable statistics item contract.

use std::sync::Arc;

use crate::column::Column;
use crate::index::Index;
use crate::load_status::StatsLoadedStatus;
use crate::memory::ItemMemUsage;

/// What a statistics cache needs from a column or index to account for and
/// evict it.
pub trait TableCacheItem {
    fn item_id(&self) -> i64;
    fn memory_usage(&self) -> ItemMemUsage;
    fn is_all_evicted(&self) -> bool;
    /// Evicted level as its numeric code.
    fn evicted_status(&self) -> u8;
    fn is_stats_initialized(&self) -> bool;
    fn stats_ver(&self) -> i64;
    fn loaded_status(&self) -> StatsLoadedStatus;
    /// Release the summaries, keeping scalar metadata.
    fn drop_unnecessary_data(&mut self);
}

impl TableCacheItem for Column {
    fn item_id(&self) -> i64 {
        self.info.id
    }

    fn memory_usage(&self) -> ItemMemUsage {
        Self::memory_usage(self)
    }

    fn is_all_evicted(&self) -> bool {
        self.loaded.is_all_evicted()
    }

    fn evicted_status(&self) -> u8 {
        self.loaded.evicted_level() as u8
    }

    fn is_stats_initialized(&self) -> bool {
        self.loaded.is_stats_initialized()
    }

    fn stats_ver(&self) -> i64 {
        self.stats_ver
    }

    fn loaded_status(&self) -> StatsLoadedStatus {
        self.loaded
    }

    fn drop_unnecessary_data(&mut self) {
        Self::drop_unnecessary_data(self);
    }
}

impl TableCacheItem for Index {
    fn item_id(&self) -> i64 {
        self.info.id
    }

    fn memory_usage(&self) -> ItemMemUsage {
        Self::memory_usage(self)
    }

    fn is_all_evicted(&self) -> bool {
        self.loaded.is_all_evicted()
    }

    fn evicted_status(&self) -> u8 {
        self.loaded.evicted_level() as u8
    }

    fn is_stats_initialized(&self) -> bool {
        self.loaded.is_stats_initialized()
    }

    fn stats_ver(&self) -> i64 {
        self.stats_ver
    }

    fn loaded_status(&self) -> StatsLoadedStatus {
        self.loaded
    }

    fn drop_unnecessary_data(&mut self) {
        Self::drop_unnecessary_data(self);
    }
}

/// A shared column or index.
///
/// Snapshots share items through `Arc`; dropping data from a shared item
/// clones it first, so other snapshots keep their copy.
#[derive(Debug, Clone)]
pub enum StatsItem {
    Column(Arc<Column>),
    Index(Arc<Index>),
}

impl StatsItem {
    #[must_use]
    pub const fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }

    #[must_use]
    pub fn physical_id(&self) -> i64 {
        match self {
            Self::Column(c) => c.physical_id,
            Self::Index(i) => i.physical_id,
        }
    }

    #[must_use]
    pub fn histogram(&self) -> &crate::histogram::Histogram {
        match self {
            Self::Column(c) => &c.histogram,
            Self::Index(i) => &i.histogram,
        }
    }

    fn as_item(&self) -> &dyn TableCacheItem {
        match self {
            Self::Column(c) => c.as_ref(),
            Self::Index(i) => i.as_ref(),
        }
    }
}

impl TableCacheItem for StatsItem {
    fn item_id(&self) -> i64 {
        self.as_item().item_id()
    }

    fn memory_usage(&self) -> ItemMemUsage {
        self.as_item().memory_usage()
    }

    fn is_all_evicted(&self) -> bool {
        self.as_item().is_all_evicted()
    }

    fn evicted_status(&self) -> u8 {
        self.as_item().evicted_status()
    }

    fn is_stats_initialized(&self) -> bool {
        self.as_item().is_stats_initialized()
    }

    fn stats_ver(&self) -> i64 {
        self.as_item().stats_ver()
    }

    fn loaded_status(&self) -> StatsLoadedStatus {
        self.as_item().loaded_status()
    }

    fn drop_unnecessary_data(&mut self) {
        match self {
            Self::Column(c) => Arc::make_mut(c).drop_unnecessary_data(),
            Self::Index(i) => Arc::make_mut(i).drop_unnecessary_data(),
        }
    }
}

impl From<Arc<Column>> for StatsItem {
    fn from(c: Arc<Column>) -> Self {
        Self::Column(c)
    }
}

impl From<Arc<Index>> for StatsItem {
    fn from(i: Arc<Index>) -> Self {
        Self::Index(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Histogram;
    use crate::load_status::EvictLevel;
    use optstats_types::{ColumnInfo, Datum, FieldType};

    fn column() -> Arc<Column> {
        let mut h = Histogram::new(3, 2, 0, 1, FieldType::bigint(), 1, 16);
        h.append_bucket(Datum::Int(1), Datum::Int(2), 4, 2);
        Arc::new(Column::new(7, ColumnInfo::new(3, "c", FieldType::bigint()), h))
    }

    #[test]
    fn test_drop_leaves_other_snapshots_intact() {
        let shared = column();
        let mut item = StatsItem::from(Arc::clone(&shared));
        assert_eq!(item.item_id(), 3);
        assert_eq!(item.evicted_status(), EvictLevel::AllLoaded as u8);
        item.drop_unnecessary_data();
        assert!(item.is_all_evicted());
        assert_eq!(item.evicted_status(), 3);
        assert_eq!(item.histogram().len(), 0);
        assert_eq!(shared.histogram.len(), 1);
        assert!(item.memory_usage().total < shared.memory_usage().total);
    }
}
