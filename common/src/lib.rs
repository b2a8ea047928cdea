//! RateVault Common Types
//!
//! Shared value types for the RateVault engine: currencies, currency pairs,
//! monetary amounts, and time helpers.

pub mod monetary;
pub mod time;

pub use monetary::*;
pub use time::*;
