//! Registry configuration.

use std::path::PathBuf;
use std::time::Duration;

/// How long a session may sit idle before the sweep may reclaim it.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(30 * 60);

/// How often the eviction sweep runs.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Configuration for a [`crate::SessionRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Root directory holding per-user session homes.
    pub sessions_root: PathBuf,
    /// Idle time after which an unattached, non-busy session is evicted.
    pub idle_threshold: Duration,
    /// Interval between eviction sweeps.
    pub sweep_interval: Duration,
}

impl RegistryConfig {
    pub fn new(sessions_root: impl Into<PathBuf>) -> Self {
        Self {
            sessions_root: sessions_root.into(),
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold = threshold;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RegistryConfig::new("/tmp/sessions");
        assert_eq!(config.sessions_root, PathBuf::from("/tmp/sessions"));
        assert_eq!(config.idle_threshold, DEFAULT_IDLE_THRESHOLD);
        assert_eq!(config.sweep_interval, DEFAULT_SWEEP_INTERVAL);
    }

    #[test]
    fn builder_overrides() {
        let config = RegistryConfig::new("/tmp/sessions")
            .idle_threshold(Duration::from_secs(60))
            .sweep_interval(Duration::from_secs(10));
        assert_eq!(config.idle_threshold, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
    }
}
