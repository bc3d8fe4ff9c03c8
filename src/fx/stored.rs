//! Repository-backed FX oracle with look-back and CAD pivot.

use super::{FxError, FxOracle};
use crate::db::Repository;
use crate::domain::{Currency, Decimal};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;
use std::sync::Arc;

/// Resolves rates from stored observations. A direct observation wins; an
/// inverse observation is used reciprocally; anything else pivots both legs
/// through CAD.
pub struct StoredRateOracle {
    repo: Arc<Repository>,
    lookback_days: u64,
}

impl fmt::Debug for StoredRateOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredRateOracle")
            .field("lookback_days", &self.lookback_days)
            .finish()
    }
}

impl StoredRateOracle {
    pub fn new(repo: Arc<Repository>, lookback_days: u64) -> Self {
        StoredRateOracle {
            repo,
            lookback_days,
        }
    }

    fn unavailable(&self, date: NaiveDate, from: &Currency, to: &Currency) -> FxError {
        FxError::RateNotAvailable {
            date,
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
            lookback_days: self.lookback_days,
        }
    }

    /// Direct observation, else the reciprocal of the inverse pair.
    async fn pair_rate(
        &self,
        date: NaiveDate,
        from: &Currency,
        to: &Currency,
    ) -> Result<Option<Decimal>, FxError> {
        let direct = self
            .repo
            .find_fx_rate_on_or_before(date, from, to, self.lookback_days)
            .await
            .map_err(|e| FxError::Store(e.to_string()))?;
        if let Some((_, rate)) = direct {
            return Ok(Some(rate));
        }

        let inverse = self
            .repo
            .find_fx_rate_on_or_before(date, to, from, self.lookback_days)
            .await
            .map_err(|e| FxError::Store(e.to_string()))?;
        Ok(inverse
            .map(|(_, rate)| Decimal::one().safe_div(rate))
            .filter(|rate| !rate.is_zero()))
    }
}

#[async_trait]
impl FxOracle for StoredRateOracle {
    async fn rate(
        &self,
        date: NaiveDate,
        from: &Currency,
        to: &Currency,
    ) -> Result<Decimal, FxError> {
        if from == to {
            return Ok(Decimal::one());
        }

        if let Some(rate) = self.pair_rate(date, from, to).await? {
            return Ok(rate);
        }

        // Cross-currency: pivot both legs through CAD.
        let cad = Currency::cad();
        if *from != cad && *to != cad {
            let from_leg = self.pair_rate(date, from, &cad).await?;
            let to_leg = self.pair_rate(date, to, &cad).await?;
            if let (Some(from_cad), Some(to_cad)) = (from_leg, to_leg) {
                let rate = from_cad.safe_div(to_cad);
                if !rate.is_zero() {
                    return Ok(rate);
                }
            }
        }

        Err(self.unavailable(date, from, to))
    }
}
