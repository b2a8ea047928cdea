//! Rate cache configuration.

use chrono::Duration;
use ratevault_common::time::constants;

/// Tunables for the rate cache.
///
/// All values are fixed at construction time and never reloaded while the
/// process runs.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// How long a refreshed table stays fresh before the next lookup
    /// triggers a refresh.
    pub refresh_interval: Duration,
    /// Half-width of the simulated fluctuation band in basis points
    /// (200 = ±2%).
    pub fluctuation_bps: u32,
    /// Deadline for a single upstream quote fetch. A fetch that exceeds it
    /// is treated as a refresh failure, never as a silent hang.
    pub source_timeout: std::time::Duration,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: constants::default_refresh_interval(),
            fluctuation_bps: 200,
            source_timeout: constants::default_source_timeout(),
        }
    }
}

impl RateCacheConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(secs) = std::env::var("RATEVAULT_REFRESH_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                config.refresh_interval = Duration::seconds(secs);
            }
        }

        if let Ok(bps) = std::env::var("RATEVAULT_FLUCTUATION_BPS") {
            if let Ok(bps) = bps.parse() {
                config.fluctuation_bps = bps;
            }
        }

        if let Ok(ms) = std::env::var("RATEVAULT_SOURCE_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.source_timeout = std::time::Duration::from_millis(ms);
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.refresh_interval <= Duration::zero() {
            return Err("Refresh interval must be positive".to_string());
        }

        if self.fluctuation_bps >= 10_000 {
            return Err("Fluctuation of 10000 bps or more allows non-positive rates".to_string());
        }

        if self.source_timeout.is_zero() {
            return Err("Source timeout cannot be zero".to_string());
        }

        Ok(())
    }
}
