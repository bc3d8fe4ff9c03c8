//! Foreign-exchange rate oracle.
//!
//! The orchestrator treats rates as an injected oracle mapping
//! `(date, from, to)` to a decimal rate, with fallback to the nearest prior
//! observation. Implementations must be idempotent and safe to retry.

use crate::domain::{Currency, Decimal};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

pub mod fixed;
pub mod stored;

pub use fixed::FixedFxOracle;
pub use stored::StoredRateOracle;

#[derive(Debug, Error, Clone)]
pub enum FxError {
    #[error("no {from}/{to} rate observed on {date} or within the {lookback_days}-day look-back")]
    RateNotAvailable {
        date: NaiveDate,
        from: String,
        to: String,
        lookback_days: u64,
    },
    #[error("rate store error: {0}")]
    Store(String),
}

/// Oracle mapping `(date, from, to)` to a CAD-pivoted decimal rate.
#[async_trait]
pub trait FxOracle: Send + Sync + fmt::Debug {
    /// Resolve the rate converting one unit of `from` into `to` on `date`,
    /// falling back to the nearest prior observation.
    ///
    /// # Errors
    /// `RateNotAvailable` when no observation exists within the look-back.
    async fn rate(
        &self,
        date: NaiveDate,
        from: &Currency,
        to: &Currency,
    ) -> Result<Decimal, FxError>;
}
