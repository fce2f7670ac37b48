//! Cache configuration.
//!
//! Controls entry lifetime and the background sweeper via the `[cache]`
//! section of `marketplace.toml`.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_MAX_AGE_SECONDS: u64 = 3600;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;

/// Cache configuration from `marketplace.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a stored result, in seconds.
    pub max_age_seconds: u64,
    /// Period of the expired-entry sweep, in seconds. Zero disables it.
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: DEFAULT_MAX_AGE_SECONDS,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            max_age_seconds: settings.max_age_seconds.get(),
            sweep_interval_seconds: settings.sweep_interval_seconds,
        }
    }
}

impl CacheConfig {
    /// Entry lifetime, clamped to at least one second.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds.max(1))
    }

    /// Sweep period, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }
}
