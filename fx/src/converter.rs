//! Thin conversion layer over the shared rate cache.

use std::sync::Arc;

use ratevault_common::{Currency, Money};
use tracing::{debug, instrument};

use crate::cache::RateCache;
use crate::error::RateResult;

/// Converts amounts between currencies.
///
/// Stateless: holds nothing but a handle to the shared cache. Any number of
/// converters may exist; they all observe the same rate generations.
#[derive(Clone)]
pub struct CurrencyConverter {
    cache: Arc<RateCache>,
}

impl CurrencyConverter {
    /// Create a converter over an explicit cache.
    pub fn new(cache: Arc<RateCache>) -> Self {
        Self { cache }
    }

    /// Create a converter over the process-wide cache.
    pub fn from_global() -> RateResult<Self> {
        Ok(Self {
            cache: RateCache::global()?,
        })
    }

    /// The cache this converter reads from.
    pub fn cache(&self) -> &Arc<RateCache> {
        &self.cache
    }

    /// Convert an amount into the target currency at the current rate,
    /// rounded to the target currency's decimal places.
    #[instrument(skip(self), fields(from = %amount.currency, to = %to, value = %amount.value))]
    pub async fn convert(&self, amount: &Money, to: &Currency) -> RateResult<Money> {
        let rate = self.cache.rate(&amount.currency, to).await?;
        let converted = Money::new(amount.value * rate, to.clone()).round();

        debug!(rate = %rate, output = %converted, "conversion completed");
        Ok(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateCacheConfig;
    use crate::source::{default_base_quotes, FixedRateSource};
    use rust_decimal_macros::dec;

    fn converter() -> CurrencyConverter {
        let source = Arc::new(FixedRateSource::new(default_base_quotes()));
        let cache = Arc::new(RateCache::new(RateCacheConfig::default(), source).unwrap());
        CurrencyConverter::new(cache)
    }

    #[tokio::test]
    async fn test_convert_uses_current_rate() {
        let converter = converter();
        let usd = Money::from_str("1000.00", Currency::usd()).unwrap();

        let eur = converter.convert(&usd, &Currency::eur()).await.unwrap();

        assert_eq!(eur.currency, Currency::eur());
        assert_eq!(eur.value, dec!(850.00));
    }

    #[tokio::test]
    async fn test_convert_rounds_to_target_places() {
        let converter = converter();
        let eur = Money::from_str("10.00", Currency::eur()).unwrap();

        // EUR/JPY is 129.5, so 10 EUR is 1295 yen, zero decimal places.
        let jpy = converter.convert(&eur, &Currency::jpy()).await.unwrap();

        assert_eq!(jpy.value, dec!(1295));
        assert_eq!(jpy.value.scale(), 0);
    }

    #[tokio::test]
    async fn test_identity_conversion_is_a_no_op() {
        let converter = converter();
        let usd = Money::from_str("42.50", Currency::usd()).unwrap();

        let same = converter.convert(&usd, &Currency::usd()).await.unwrap();

        assert_eq!(same.value, dec!(42.50));
        // Identity lookups never populate the table.
        assert_eq!(converter.cache().generation(), 0);
    }

    #[tokio::test]
    async fn test_converters_share_one_cache() {
        let a = converter();
        let b = a.clone();

        let usd = Money::from_str("100", Currency::usd()).unwrap();
        a.convert(&usd, &Currency::gbp()).await.unwrap();
        b.convert(&usd, &Currency::gbp()).await.unwrap();

        // The second converter reused the table the first one populated.
        assert_eq!(a.cache().refresh_count(), 1);
        assert!(Arc::ptr_eq(a.cache(), b.cache()));
    }
}
