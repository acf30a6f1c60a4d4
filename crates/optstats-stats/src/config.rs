//! Estimation settings.
//!
//! [`StatsOptions`] is the plain, serializable form. [`StatsConfig`] is the
//! live value shared through `Arc`; setters take effect for every call that
//! starts afterwards.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Default `modify_count / row_count` ratio above which a table is outdated.
pub const DEFAULT_RATIO_OF_PSEUDO_ESTIMATE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsOptions {
    pub ratio_of_pseudo_estimate: f64,
    /// Synchronous loading is configured, so a missing histogram at
    /// estimation time is unexpected and worth a warning.
    pub sync_load_enabled: bool,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            ratio_of_pseudo_estimate: DEFAULT_RATIO_OF_PSEUDO_ESTIMATE,
            sync_load_enabled: false,
        }
    }
}

#[derive(Debug)]
pub struct StatsConfig {
    ratio_bits: AtomicU64,
    sync_load: AtomicBool,
}

impl StatsConfig {
    #[must_use]
    pub fn new(options: StatsOptions) -> Self {
        Self {
            ratio_bits: AtomicU64::new(options.ratio_of_pseudo_estimate.to_bits()),
            sync_load: AtomicBool::new(options.sync_load_enabled),
        }
    }

    #[must_use]
    pub fn ratio_of_pseudo_estimate(&self) -> f64 {
        f64::from_bits(self.ratio_bits.load(Ordering::Relaxed))
    }

    pub fn set_ratio_of_pseudo_estimate(&self, ratio: f64) {
        self.ratio_bits.store(ratio.to_bits(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn sync_load_enabled(&self) -> bool {
        self.sync_load.load(Ordering::Relaxed)
    }

    pub fn set_sync_load_enabled(&self, enabled: bool) {
        self.sync_load.store(enabled, Ordering::Relaxed);
    }

    /// Current values as options.
    #[must_use]
    pub fn snapshot(&self) -> StatsOptions {
        StatsOptions {
            ratio_of_pseudo_estimate: self.ratio_of_pseudo_estimate(),
            sync_load_enabled: self.sync_load_enabled(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self::new(StatsOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_partial_json() {
        let opts: StatsOptions = serde_json::from_str(r#"{"ratio_of_pseudo_estimate": 0.25}"#).unwrap();
        assert_eq!(opts.ratio_of_pseudo_estimate, 0.25);
        assert!(!opts.sync_load_enabled);
    }

    #[test]
    fn test_runtime_update() {
        let cfg = StatsConfig::default();
        assert_eq!(cfg.ratio_of_pseudo_estimate(), DEFAULT_RATIO_OF_PSEUDO_ESTIMATE);
        cfg.set_ratio_of_pseudo_estimate(0.1);
        cfg.set_sync_load_enabled(true);
        assert_eq!(
            cfg.snapshot(),
            StatsOptions {
                ratio_of_pseudo_estimate: 0.1,
                sync_load_enabled: true
            }
        );
    }
}
