//! Configuration store
//!
//! Holds the single live [`OperatingConfig`]. Readers take an `Arc` snapshot;
//! writers replace the whole value. The store is owned by the node event loop,
//! so reads and writes are already serialized and no lock is needed.

use super::OperatingConfig;
use std::sync::Arc;
use tracing::debug;

/// Holder of the live configuration snapshot
#[derive(Debug, Clone)]
pub struct ConfigStore {
    current: Arc<OperatingConfig>,
    generation: u64,
}

impl ConfigStore {
    /// Store with `config` live at generation 0
    pub fn new(config: OperatingConfig) -> Self {
        Self {
            current: Arc::new(config),
            generation: 0,
        }
    }

    /// Point-in-time snapshot of the live configuration
    pub fn current(&self) -> Arc<OperatingConfig> {
        Arc::clone(&self.current)
    }

    /// Replace the live configuration wholesale
    ///
    /// No validation and no side effects on the hardware. Snapshots taken
    /// before the call keep the old value. Returns the new generation.
    pub fn apply(&mut self, config: OperatingConfig) -> u64 {
        self.current = Arc::new(config);
        self.generation += 1;
        debug!("Configuration replaced (generation {})", self.generation);
        self.generation
    }

    /// Number of times the configuration has been replaced
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(OperatingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_replaces_whole_config() {
        let mut store = ConfigStore::default();
        let before = store.current();

        let generation = store.apply(OperatingConfig {
            gimbal_mode: 2,
            state_poll_rate: 25.0,
            ..Default::default()
        });

        assert_eq!(generation, 1);
        assert_eq!(store.current().gimbal_mode, 2);
        assert_eq!(store.current().state_poll_rate, 25.0);
        // Earlier snapshot is unaffected
        assert_eq!(before.gimbal_mode, 1);
    }

    #[test]
    fn test_apply_accepts_out_of_range_codes() {
        let mut store = ConfigStore::default();
        store.apply(OperatingConfig {
            gimbal_mode: 42,
            ..Default::default()
        });
        assert_eq!(store.current().gimbal_mode, 42);
        assert!(store.current().gimbal_mode().is_err());
    }
}
