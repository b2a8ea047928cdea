//! Immutable rate table generations.
//!
//! A [`RateTable`] is one complete generation of the pair → rate mapping.
//! Tables are built off to the side from a batch of forward quotes and then
//! swapped into the cache as a single unit, so no reader can ever observe a
//! pair without its reciprocal or a mix of generations.

use std::collections::HashMap;

use chrono::Duration;
use ratevault_common::{now, CurrencyPair, Timestamp};
use rust_decimal::Decimal;

use crate::error::{RateError, RateResult};
use crate::source::RateQuote;

/// One generation of the rate mapping.
///
/// Never mutated after construction. For every stored forward pair the
/// derived reciprocal pair is also present, so `rate(A,B) * rate(B,A)` is 1
/// up to decimal rounding.
#[derive(Debug, Clone)]
pub struct RateTable {
    rates: HashMap<CurrencyPair, Decimal>,
    generation: u64,
    refreshed_at: Option<Timestamp>,
}

impl RateTable {
    /// The never-refreshed table: generation 0, no entries, always stale.
    pub fn empty() -> Self {
        Self {
            rates: HashMap::new(),
            generation: 0,
            refreshed_at: None,
        }
    }

    /// Build a complete table from a batch of forward quotes.
    ///
    /// `refreshed_at` is the start time of the refresh that produced this
    /// generation. Every quote is validated and its reciprocal derived; a
    /// single bad quote fails the whole batch.
    pub fn from_quotes(
        generation: u64,
        refreshed_at: Timestamp,
        quotes: &[RateQuote],
    ) -> RateResult<Self> {
        let mut rates = HashMap::with_capacity(quotes.len() * 2);

        for q in quotes {
            if q.rate <= Decimal::ZERO {
                return Err(RateError::InvalidQuote {
                    pair: q.pair.clone(),
                    rate: q.rate,
                    reason: "rate must be positive".to_string(),
                });
            }
            if q.pair.is_identity() {
                return Err(RateError::InvalidQuote {
                    pair: q.pair.clone(),
                    rate: q.rate,
                    reason: "identity pairs are implicit and never stored".to_string(),
                });
            }

            rates.insert(q.pair.clone(), q.rate);
            rates.insert(q.pair.inverse(), Decimal::ONE / q.rate);
        }

        Ok(Self {
            rates,
            generation,
            refreshed_at: Some(refreshed_at),
        })
    }

    /// Look up the rate for a pair.
    pub fn rate(&self, pair: &CurrencyPair) -> Option<Decimal> {
        self.rates.get(pair).copied()
    }

    /// Number of stored pairs (forward and reciprocal both count).
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Whether the table has never been populated.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// The generation counter of this table.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When the refresh producing this generation started, if ever.
    pub fn refreshed_at(&self) -> Option<Timestamp> {
        self.refreshed_at
    }

    /// Whether this table is older than the given interval.
    ///
    /// A never-refreshed table is always stale.
    pub fn is_stale(&self, interval: Duration) -> bool {
        match self.refreshed_at {
            None => true,
            Some(t) => now().signed_duration_since(t) > interval,
        }
    }

    /// Iterate over all stored pairs and their rates.
    pub fn iter(&self) -> impl Iterator<Item = (&CurrencyPair, Decimal)> {
        self.rates.iter().map(|(pair, rate)| (pair, *rate))
    }
}
