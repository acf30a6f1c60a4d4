//! Items whose statistics must be loaded in the background.
//!
//! Estimation threads insert an id when they meet partially loaded
//! statistics; the background loader drains the set. Reads take the shared
//! lock, mutations the exclusive one, and no call ever reaches back into the
//! estimator.

use std::collections::HashSet;

use optstats_types::TableItemId;

#[derive(Debug, Default)]
pub struct NeededItems {
    items: parking_lot::RwLock<HashSet<TableItemId>>,
}

impl NeededItems {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every pending item, in no particular order.
    #[must_use]
    pub fn all_items(&self) -> Vec<TableItemId> {
        self.items.read().iter().copied().collect()
    }

    pub fn insert(&self, item: TableItemId) {
        self.items.write().insert(item);
    }

    pub fn delete(&self, item: TableItemId) {
        self.items.write().remove(&item);
    }

    #[must_use]
    pub fn contains(&self, item: TableItemId) -> bool {
        self.items.read().contains(&item)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
