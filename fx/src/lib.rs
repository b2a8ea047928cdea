//! RateVault FX Engine
//!
//! A process-wide, lazily constructed, TTL-refreshed cache of exchange rates
//! with a thin conversion layer on top.
//!
//! # Features
//!
//! - One shared rate table per process, refreshed in place on a timed schedule
//! - Double-checked refresh discipline: at most one refresh per stale window,
//!   no matter how many callers race
//! - Whole-table swaps: readers never observe a partially refreshed table
//! - Replaceable [`RateSource`] boundary so tests can inject fixed rates
//!
//! # Example
//!
//! ```rust,ignore
//! use ratevault_common::{Currency, Money};
//! use ratevault_fx::CurrencyConverter;
//!
//! let converter = CurrencyConverter::from_global()?;
//!
//! let usd = Money::from_str("1000.00", Currency::usd())?;
//! let eur = converter.convert(&usd, &Currency::eur()).await?;
//! ```

pub mod cache;
pub mod config;
pub mod converter;
pub mod error;
pub mod source;
pub mod table;

pub use cache::{CacheStats, RateCache};
pub use config::RateCacheConfig;
pub use converter::CurrencyConverter;
pub use error::{RateError, RateResult};
pub use source::{default_base_quotes, RateQuote, RateSource, SimulatedRateSource};
pub use table::RateTable;

#[cfg(any(test, feature = "test-utils"))]
pub use source::FixedRateSource;
