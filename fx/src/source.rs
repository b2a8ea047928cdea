//! Rate sources: where quote data comes from.
//!
//! The cache never talks to the outside world directly. Everything it knows
//! arrives through the [`RateSource`] trait, so a real upstream feed, a
//! simulation, or a test fixture can be swapped in without touching the
//! caching logic.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ratevault_common::{Currency, CurrencyPair};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RateError, RateResult};

/// A single forward quote produced by a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateQuote {
    /// The quoted pair.
    pub pair: CurrencyPair,
    /// Units of quote currency per unit of base currency.
    pub rate: Decimal,
}

impl RateQuote {
    /// Create a new quote.
    pub fn new(pair: CurrencyPair, rate: Decimal) -> Self {
        Self { pair, rate }
    }
}

/// Trait for rate sources.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Short identifier used in logs and error reports.
    fn name(&self) -> &str;

    /// Produce a complete set of forward quotes.
    ///
    /// Implementations return every pair they know about on each call;
    /// reciprocal pairs are derived by the table, not the source.
    async fn quotes(&self) -> RateResult<Vec<RateQuote>>;
}

/// The default set of quoted majors.
pub fn default_base_quotes() -> Vec<RateQuote> {
    fn quote(base: &str, quote: &str, rate: Decimal) -> RateQuote {
        RateQuote::new(
            CurrencyPair::new(Currency::new(base), Currency::new(quote)),
            rate,
        )
    }

    vec![
        quote("USD", "EUR", Decimal::new(85, 2)),
        quote("USD", "GBP", Decimal::new(75, 2)),
        quote("USD", "JPY", Decimal::from(110)),
        quote("EUR", "GBP", Decimal::new(88, 2)),
        quote("EUR", "JPY", Decimal::new(1295, 1)),
        quote("GBP", "JPY", Decimal::new(1467, 1)),
    ]
}

/// Simulated rate source.
///
/// Stands in for a real market-data feed: every fetch perturbs a fixed set of
/// base quotes by a uniform fluctuation within ±`fluctuation_bps`. Pass a seed
/// for reproducible runs.
pub struct SimulatedRateSource {
    base_quotes: Vec<RateQuote>,
    fluctuation_bps: u32,
    rng: Mutex<StdRng>,
}

impl SimulatedRateSource {
    /// Create a source over a custom base quote set.
    pub fn new(
        base_quotes: Vec<RateQuote>,
        fluctuation_bps: u32,
        seed: Option<u64>,
    ) -> RateResult<Self> {
        if base_quotes.is_empty() {
            return Err(RateError::Configuration(
                "Simulated source needs at least one base quote".to_string(),
            ));
        }

        if fluctuation_bps >= 10_000 {
            return Err(RateError::Configuration(format!(
                "Fluctuation of {} bps allows non-positive rates",
                fluctuation_bps
            )));
        }

        for q in &base_quotes {
            if q.rate <= Decimal::ZERO {
                return Err(RateError::InvalidQuote {
                    pair: q.pair.clone(),
                    rate: q.rate,
                    reason: "base rate must be positive".to_string(),
                });
            }
            if q.pair.is_identity() {
                return Err(RateError::InvalidQuote {
                    pair: q.pair.clone(),
                    rate: q.rate,
                    reason: "identity pairs are implicit and never quoted".to_string(),
                });
            }
        }

        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            base_quotes,
            fluctuation_bps,
            rng: Mutex::new(rng),
        })
    }

    /// Create a source over the default majors.
    pub fn with_default_quotes(fluctuation_bps: u32, seed: Option<u64>) -> RateResult<Self> {
        Self::new(default_base_quotes(), fluctuation_bps, seed)
    }
}

#[async_trait]
impl RateSource for SimulatedRateSource {
    fn name(&self) -> &str {
        "SIMULATED"
    }

    async fn quotes(&self) -> RateResult<Vec<RateQuote>> {
        let span = i64::from(self.fluctuation_bps);
        let mut rng = self.rng.lock();

        let quotes = self
            .base_quotes
            .iter()
            .map(|q| {
                let bps = rng.gen_range(-span..=span);
                let factor = Decimal::ONE + Decimal::from(bps) / Decimal::from(10_000);
                RateQuote::new(q.pair.clone(), q.rate * factor)
            })
            .collect::<Vec<_>>();

        debug!(count = quotes.len(), "simulated quotes generated");
        Ok(quotes)
    }
}

/// Fixture source returning a settable quote set.
#[cfg(any(test, feature = "test-utils"))]
pub struct FixedRateSource {
    quotes: Mutex<Vec<RateQuote>>,
    fetches: std::sync::atomic::AtomicU64,
    failing: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-utils"))]
impl FixedRateSource {
    /// Create a source that always returns the given quotes.
    pub fn new(quotes: Vec<RateQuote>) -> Self {
        Self {
            quotes: Mutex::new(quotes),
            fetches: std::sync::atomic::AtomicU64::new(0),
            failing: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Replace the quote set returned by future fetches.
    pub fn set_quotes(&self, quotes: Vec<RateQuote>) {
        *self.quotes.lock() = quotes;
    }

    /// Make future fetches fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// How many fetches were attempted against this source.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for FixedRateSource {
    fn name(&self) -> &str {
        "FIXED"
    }

    async fn quotes(&self) -> RateResult<Vec<RateQuote>> {
        self.fetches
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(RateError::SourceFailure {
                source_name: self.name().to_string(),
                message: "simulated outage".to_string(),
            });
        }

        Ok(self.quotes.lock().clone())
    }
}
