//! Time utilities and defaults for the RateVault engine.

use chrono::{DateTime, Duration, Utc};

/// Engine timing defaults.
pub mod constants {
    use super::Duration;

    /// How long one rate generation stays fresh (1 hour).
    pub fn default_refresh_interval() -> Duration {
        Duration::hours(1)
    }

    /// Upper bound on a single upstream quote fetch (5 seconds).
    pub fn default_source_timeout() -> std::time::Duration {
        std::time::Duration::from_secs(5)
    }
}

/// A timestamp with timezone (always UTC for RateVault).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Check if a timestamp has expired (is in the past).
pub fn is_expired(expiry: Timestamp) -> bool {
    now() > expiry
}

/// Calculate expiry time from now.
pub fn expires_in(duration: Duration) -> Timestamp {
    now() + duration
}

/// Duration extensions for convenient conversion.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}
