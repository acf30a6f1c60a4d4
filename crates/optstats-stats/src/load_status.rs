//! Load and eviction state of one column or index.

use serde::{Deserialize, Serialize};

/// How much of an item's statistics has been evicted from memory, from least
/// to most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum EvictLevel {
    #[default]
    AllLoaded = 0,
    OnlyCmsEvicted = 1,
    OnlyHistRemained = 2,
    AllEvicted = 3,
}

impl EvictLevel {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AllLoaded => "allLoaded",
            Self::OnlyCmsEvicted => "onlyCmsEvicted",
            Self::OnlyHistRemained => "onlyHistRemained",
            Self::AllEvicted => "allEvicted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StatsLoadedStatus {
    stats_initialized: bool,
    evicted: EvictLevel,
}

impl StatsLoadedStatus {
    /// Statistics exist and are fully resident.
    #[must_use]
    pub const fn full_load() -> Self {
        Self {
            stats_initialized: true,
            evicted: EvictLevel::AllLoaded,
        }
    }

    /// Statistics exist in storage but nothing is resident.
    #[must_use]
    pub const fn all_evicted() -> Self {
        Self {
            stats_initialized: true,
            evicted: EvictLevel::AllEvicted,
        }
    }

    /// No statistics were ever collected.
    #[must_use]
    pub const fn uninitialized() -> Self {
        Self {
            stats_initialized: false,
            evicted: EvictLevel::AllLoaded,
        }
    }

    #[must_use]
    pub const fn with_evicted(mut self, level: EvictLevel) -> Self {
        self.evicted = level;
        self
    }

    pub fn set_evicted(&mut self, level: EvictLevel) {
        self.evicted = level;
    }

    #[must_use]
    pub const fn evicted_level(&self) -> EvictLevel {
        self.evicted
    }

    #[must_use]
    pub const fn is_stats_initialized(&self) -> bool {
        self.stats_initialized
    }

    #[must_use]
    pub fn is_all_evicted(&self) -> bool {
        self.stats_initialized && self.evicted >= EvictLevel::AllEvicted
    }

    #[must_use]
    pub fn is_cms_evicted(&self) -> bool {
        self.stats_initialized && self.evicted >= EvictLevel::OnlyCmsEvicted
    }

    #[must_use]
    pub fn is_topn_evicted(&self) -> bool {
        self.stats_initialized && self.evicted >= EvictLevel::OnlyHistRemained
    }

    /// Enough is resident to estimate: at least the histogram.
    #[must_use]
    pub fn is_essential_stats_loaded(&self) -> bool {
        self.stats_initialized && self.evicted < EvictLevel::AllEvicted
    }

    #[must_use]
    pub fn is_full_load(&self) -> bool {
        self.stats_initialized && self.evicted == EvictLevel::AllLoaded
    }

    /// Some collected statistics are not resident.
    #[must_use]
    pub fn is_load_needed(&self) -> bool {
        self.stats_initialized && self.evicted > EvictLevel::AllLoaded
    }

    #[must_use]
    pub const fn status_to_string(&self) -> &'static str {
        if self.stats_initialized {
            self.evicted.name()
        } else {
            "unInitialized"
        }
    }
}
