//! The process-wide, TTL-refreshed rate cache.
//!
//! One [`RateCache`] owns one [`RateTable`] generation at a time. Lookups are
//! lock-free in spirit: the common case takes a short read lock, checks
//! freshness, and reads. Only when the table is stale does a caller enter the
//! slow path:
//!
//! 1. check staleness without exclusivity (cheap fast path),
//! 2. acquire the refresh gate,
//! 3. check staleness again (another caller may have refreshed while this one
//!    waited),
//! 4. only if still stale, fetch quotes and swap in a fresh table.
//!
//! The blocking-read policy applies uniformly: every caller that observed a
//! stale table waits on the gate and then reads the fresh generation. Readers
//! that never observed staleness keep reading the current table; the swap is
//! a single pointer-sized publish under the write lock, so no reader ever
//! sees a half-built table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use ratevault_common::{now, Currency, CurrencyPair, Timestamp};
use rust_decimal::Decimal;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};

use crate::config::RateCacheConfig;
use crate::error::{RateError, RateResult};
use crate::source::{RateSource, SimulatedRateSource};
use crate::table::RateTable;

static GLOBAL: OnceCell<Arc<RateCache>> = OnceCell::new();

/// Process-wide cache of exchange rates with bounded staleness.
pub struct RateCache {
    source: Arc<dyn RateSource>,
    config: RateCacheConfig,
    /// Current table generation. Written only by the swap inside a refresh.
    table: RwLock<RateTable>,
    /// Serializes refreshes. Held across the source fetch, never while the
    /// table write lock is held.
    refresh_gate: AsyncMutex<()>,
    refreshes: AtomicU64,
}

impl RateCache {
    /// Create a cache over the given source.
    ///
    /// Fails on invalid configuration without leaving any partial state
    /// behind.
    pub fn new(config: RateCacheConfig, source: Arc<dyn RateSource>) -> RateResult<Self> {
        config.validate().map_err(RateError::Configuration)?;

        debug!(
            source = source.name(),
            refresh_interval_secs = config.refresh_interval.num_seconds(),
            "rate cache created"
        );

        Ok(Self {
            source,
            config,
            table: RwLock::new(RateTable::empty()),
            refresh_gate: AsyncMutex::new(()),
            refreshes: AtomicU64::new(0),
        })
    }

    /// The process-wide instance, constructed on first call.
    ///
    /// Concurrent first callers all receive the same fully-built instance;
    /// construction happens at most once per attempt and a failed attempt
    /// leaves the slot empty so a later call can retry.
    pub fn global() -> RateResult<Arc<RateCache>> {
        GLOBAL
            .get_or_try_init(|| {
                let config = RateCacheConfig::from_env();
                let source = Arc::new(SimulatedRateSource::with_default_quotes(
                    config.fluctuation_bps,
                    None,
                )?);
                RateCache::new(config, source).map(Arc::new)
            })
            .cloned()
    }

    /// Current rate for one unit of `base` in `quote`.
    ///
    /// Identity pairs short-circuit to 1 and never touch the table. Anything
    /// else refreshes first if the current generation is stale, then looks the
    /// pair up; a pair missing from a fresh table is
    /// [`RateError::RateUnavailable`].
    #[instrument(skip(self), fields(base = %base, quote = %quote))]
    pub async fn rate(&self, base: &Currency, quote: &Currency) -> RateResult<Decimal> {
        if base == quote {
            return Ok(Decimal::ONE);
        }

        self.refresh_if_stale().await?;

        let pair = CurrencyPair::new(base.clone(), quote.clone());
        self.table
            .read()
            .rate(&pair)
            .ok_or(RateError::RateUnavailable(pair))
    }

    /// A copy of the current table generation.
    ///
    /// Only copies cross the cache boundary; nothing outside the cache can
    /// mutate the live table.
    pub fn snapshot(&self) -> RateTable {
        self.table.read().clone()
    }

    /// Generation counter of the currently visible table.
    pub fn generation(&self) -> u64 {
        self.table.read().generation()
    }

    /// Start time of the refresh that produced the visible table.
    pub fn refreshed_at(&self) -> Option<Timestamp> {
        self.table.read().refreshed_at()
    }

    /// Number of successful refreshes since construction.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Operational counters for logs and the simulator.
    pub fn stats(&self) -> CacheStats {
        let table = self.table.read();
        CacheStats {
            generation: table.generation(),
            pairs: table.len(),
            refreshed_at: table.refreshed_at(),
            refreshes: self.refresh_count(),
        }
    }

    fn is_stale(&self) -> bool {
        self.table.read().is_stale(self.config.refresh_interval)
    }

    async fn refresh_if_stale(&self) -> RateResult<()> {
        // Fast path: the common case is a fresh table and no locking beyond
        // a short read lock.
        if !self.is_stale() {
            return Ok(());
        }

        let _gate = self.refresh_gate.lock().await;

        // Re-check after acquiring the gate: a concurrent caller may have
        // refreshed while this one waited.
        if !self.is_stale() {
            return Ok(());
        }

        self.refresh().await
    }

    /// Perform one refresh. Caller must hold the refresh gate.
    ///
    /// A failure here is reported to the triggering caller only; the previous
    /// table stays visible and valid for everyone else.
    async fn refresh(&self) -> RateResult<()> {
        let started_at = now();
        let next_generation = self.table.read().generation() + 1;

        let fetch = self.source.quotes();
        let quotes = match tokio::time::timeout(self.config.source_timeout, fetch).await {
            Ok(result) => result?,
            Err(_) => {
                let err = RateError::SourceTimeout {
                    source_name: self.source.name().to_string(),
                    timeout_ms: self.config.source_timeout.as_millis() as u64,
                };
                warn!(source = self.source.name(), "quote fetch timed out");
                return Err(err);
            }
        };

        // Build the new generation off to the side, then publish it as a
        // single unit.
        let fresh = RateTable::from_quotes(next_generation, started_at, &quotes)?;
        let pairs = fresh.len();

        *self.table.write() = fresh;
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        info!(
            generation = next_generation,
            pairs,
            source = self.source.name(),
            "rate table refreshed"
        );

        Ok(())
    }
}

/// Cache counters.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub generation: u64,
    pub pairs: usize,
    pub refreshed_at: Option<Timestamp>,
    pub refreshes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{default_base_quotes, FixedRateSource, RateQuote};
    use async_trait::async_trait;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use tokio::sync::Barrier;

    fn short_interval_config(ms: i64) -> RateCacheConfig {
        RateCacheConfig {
            refresh_interval: Duration::milliseconds(ms),
            ..Default::default()
        }
    }

    fn fixed_cache(config: RateCacheConfig) -> (Arc<RateCache>, Arc<FixedRateSource>) {
        let source = Arc::new(FixedRateSource::new(default_base_quotes()));
        let cache = RateCache::new(config, source.clone()).unwrap();
        (Arc::new(cache), source)
    }

    #[tokio::test]
    async fn test_identity_rate_needs_no_table() {
        let (cache, source) = fixed_cache(RateCacheConfig::default());

        let rate = cache.rate(&Currency::usd(), &Currency::usd()).await.unwrap();

        assert_eq!(rate, Decimal::ONE);
        assert_eq!(source.fetch_count(), 0);
        assert_eq!(cache.generation(), 0);
    }

    #[tokio::test]
    async fn test_cold_start_triggers_single_refresh() {
        let (cache, source) = fixed_cache(RateCacheConfig::default());

        let first = cache.rate(&Currency::usd(), &Currency::eur()).await.unwrap();
        assert_eq!(first, dec!(0.85));
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(cache.generation(), 1);

        // Within the interval the second lookup reuses the table.
        let second = cache.rate(&Currency::usd(), &Currency::eur()).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(cache.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_simulated_cold_start_lands_near_base() {
        let source = Arc::new(SimulatedRateSource::with_default_quotes(200, Some(42)).unwrap());
        let cache = RateCache::new(RateCacheConfig::default(), source).unwrap();

        let rate = cache.rate(&Currency::usd(), &Currency::eur()).await.unwrap();

        assert!(rate >= dec!(0.85) * dec!(0.98));
        assert!(rate <= dec!(0.85) * dec!(1.02));
    }

    #[tokio::test]
    async fn test_staleness_bound_holds_after_lookup() {
        let (cache, _) = fixed_cache(RateCacheConfig::default());

        cache.rate(&Currency::gbp(), &Currency::jpy()).await.unwrap();

        let refreshed_at = cache.refreshed_at().unwrap();
        assert!(now().signed_duration_since(refreshed_at) <= Duration::hours(1));
    }

    #[tokio::test]
    async fn test_unknown_pair_reported_after_refresh() {
        let (cache, source) = fixed_cache(RateCacheConfig::default());

        let result = cache.rate(&Currency::new("CHF"), &Currency::new("SEK")).await;

        // The lookup still refreshed the table; only the pair is missing.
        assert_eq!(source.fetch_count(), 1);
        assert!(matches!(result, Err(RateError::RateUnavailable(_))));
    }

    #[tokio::test]
    async fn test_reciprocals_served_from_same_generation() {
        let (cache, _) = fixed_cache(RateCacheConfig::default());

        let forward = cache.rate(&Currency::usd(), &Currency::jpy()).await.unwrap();
        let backward = cache.rate(&Currency::jpy(), &Currency::usd()).await.unwrap();

        assert!((forward * backward - Decimal::ONE).abs() < Decimal::new(1, 12));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_generation() {
        let (cache, source) = fixed_cache(short_interval_config(50));

        let first = cache.rate(&Currency::usd(), &Currency::eur()).await.unwrap();
        assert_eq!(cache.generation(), 1);

        source.set_failing(true);
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;

        // The triggering caller sees the failure...
        let failed = cache.rate(&Currency::usd(), &Currency::eur()).await;
        assert!(matches!(failed, Err(RateError::SourceFailure { .. })));

        // ...but the old table is still visible and intact.
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.generation(), 1);
        assert_eq!(
            snapshot.rate(&CurrencyPair::new(Currency::usd(), Currency::eur())),
            Some(first)
        );

        // Recovery: the next successful refresh moves to generation 2.
        source.set_failing(false);
        cache.rate(&Currency::usd(), &Currency::eur()).await.unwrap();
        assert_eq!(cache.generation(), 2);
    }

    struct StallingSource;

    #[async_trait]
    impl RateSource for StallingSource {
        fn name(&self) -> &str {
            "STALLING"
        }

        async fn quotes(&self) -> RateResult<Vec<RateQuote>> {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            Ok(default_base_quotes())
        }
    }

    #[tokio::test]
    async fn test_source_timeout_is_a_refresh_failure() {
        let config = RateCacheConfig {
            source_timeout: std::time::Duration::from_millis(50),
            ..Default::default()
        };
        let cache = RateCache::new(config, Arc::new(StallingSource)).unwrap();

        let result = cache.rate(&Currency::usd(), &Currency::eur()).await;

        assert!(matches!(result, Err(RateError::SourceTimeout { .. })));
        assert_eq!(cache.generation(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_stale_window_refreshes_once_under_contention() {
        let (cache, source) = fixed_cache(RateCacheConfig::default());
        let barrier = Arc::new(Barrier::new(50));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let cache = cache.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                cache.rate(&Currency::usd(), &Currency::eur()).await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), dec!(0.85));
        }

        // Fifty concurrent first lookups, exactly one refresh.
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(cache.refresh_count(), 1);
        assert_eq!(cache.generation(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_generations_never_decrease_for_readers() {
        let (cache, _) = fixed_cache(short_interval_config(5));

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for _ in 0..30 {
                    let _ = cache.rate(&Currency::usd(), &Currency::eur()).await;
                    tokio::time::sleep(std::time::Duration::from_millis(3)).await;
                }
            })
        };

        let reader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                let mut last = 0u64;
                for _ in 0..200 {
                    let generation = cache.generation();
                    assert!(generation >= last, "generation went backwards");
                    last = generation;
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
        assert!(cache.generation() > 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_snapshots_are_never_torn() {
        // A near-zero interval makes almost every lookup refresh, maximizing
        // swap churn.
        let (cache, _) = fixed_cache(short_interval_config(1));

        let mut writers = Vec::new();
        for _ in 0..3 {
            let cache = cache.clone();
            writers.push(tokio::spawn(async move {
                for _ in 0..30 {
                    cache.rate(&Currency::eur(), &Currency::jpy()).await.unwrap();
                }
            }));
        }

        let mut readers = Vec::new();
        for _ in 0..3 {
            let cache = cache.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let snapshot = cache.snapshot();
                    if snapshot.is_empty() {
                        continue;
                    }
                    // A sampled table is always one full generation: every
                    // pair carries its reciprocal from the same batch.
                    assert_eq!(snapshot.len(), 12);
                    for (pair, rate) in snapshot.iter() {
                        let reciprocal = snapshot.rate(&pair.inverse()).unwrap();
                        assert!((rate * reciprocal - Decimal::ONE).abs() < Decimal::new(1, 12));
                    }
                }
            }));
        }

        for handle in writers.into_iter().chain(readers) {
            handle.await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_global_returns_one_instance() {
        let mut handles = Vec::new();
        for _ in 0..16 {
            handles.push(tokio::spawn(async { RateCache::global().unwrap() }));
        }

        let first = RateCache::global().unwrap();
        for handle in handles {
            let instance = handle.await.unwrap();
            assert!(Arc::ptr_eq(&first, &instance));
        }
    }

    #[test]
    fn test_failed_construction_leaves_slot_empty() {
        let slot: OnceCell<Arc<RateCache>> = OnceCell::new();

        let bad_config = RateCacheConfig {
            refresh_interval: Duration::zero(),
            ..Default::default()
        };
        let failed = slot.get_or_try_init(|| {
            let source = Arc::new(SimulatedRateSource::with_default_quotes(200, None)?);
            RateCache::new(bad_config, source).map(Arc::new)
        });

        assert!(failed.is_err());
        assert!(slot.get().is_none());

        // The slot is not poisoned; a later attempt with a valid
        // configuration succeeds.
        let retried = slot.get_or_try_init(|| {
            let source = Arc::new(SimulatedRateSource::with_default_quotes(200, None)?);
            RateCache::new(RateCacheConfig::default(), source).map(Arc::new)
        });

        assert!(retried.is_ok());
        assert!(slot.get().is_some());
    }
}
