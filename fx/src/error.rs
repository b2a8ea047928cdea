//! Rate engine error types.

use ratevault_common::CurrencyPair;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur in the rate engine.
///
/// A pair that is missing from a freshly refreshed table is reported as
/// [`RateError::RateUnavailable`] rather than silently converted 1:1; callers
/// that want a pass-through for unknown pairs must opt in explicitly.
#[derive(Debug, Error)]
pub enum RateError {
    /// No rate is known for the requested currency pair.
    #[error("No rate available for {0}")]
    RateUnavailable(CurrencyPair),

    /// A source produced a quote the engine refuses to store.
    #[error("Rejected quote for {pair}: {reason}")]
    InvalidQuote {
        pair: CurrencyPair,
        rate: Decimal,
        reason: String,
    },

    /// The upstream source failed to deliver quotes.
    #[error("Rate source {source_name} failed: {message}")]
    SourceFailure {
        source_name: String,
        message: String,
    },

    /// The upstream source exceeded its fetch deadline.
    #[error("Rate source {source_name} timed out after {timeout_ms}ms")]
    SourceTimeout { source_name: String, timeout_ms: u64 },

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for rate engine operations.
pub type RateResult<T> = Result<T, RateError>;
