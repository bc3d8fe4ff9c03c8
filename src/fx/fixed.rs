//! Fixed-rate oracle for tests: no store, predefined pairs.

use super::{FxError, FxOracle};
use crate::domain::{Currency, Decimal};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Returns preconfigured rates regardless of date.
#[derive(Debug, Clone, Default)]
pub struct FixedFxOracle {
    rates: HashMap<(String, String), Decimal>,
}

impl FixedFxOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, from: &Currency, to: &Currency, rate: Decimal) -> Self {
        self.rates.insert(
            (from.as_str().to_string(), to.as_str().to_string()),
            rate,
        );
        self
    }
}

#[async_trait]
impl FxOracle for FixedFxOracle {
    async fn rate(
        &self,
        date: NaiveDate,
        from: &Currency,
        to: &Currency,
    ) -> Result<Decimal, FxError> {
        if from == to {
            return Ok(Decimal::one());
        }
        self.rates
            .get(&(from.as_str().to_string(), to.as_str().to_string()))
            .copied()
            .ok_or_else(|| FxError::RateNotAvailable {
                date,
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
                lookback_days: 0,
            })
    }
}
