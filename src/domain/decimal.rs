//! Fixed-precision decimal type for ACB arithmetic.
//!
//! Backed by rust_decimal; all intermediate computation stays unrounded and
//! rounding happens only when a value is assigned into a persisted field,
//! through one of the scale-specific `round_*` profiles (half-up).

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal as RustDecimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Scale for CAD monetary values (stored ACB, gains, fees).
pub const MONEY_SCALE: u32 = 2;
/// Scale for share quantities.
pub const SHARE_SCALE: u32 = 6;
/// Display scale for per-share CAD figures (ACB per share, price in CAD).
pub const PER_SHARE_SCALE: u32 = 4;
/// Scale for FX rates.
pub const RATE_SCALE: u32 = 6;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecimalError {
    /// The floating-point input cannot be represented exactly.
    #[error("precision loss converting {0} to a decimal")]
    PrecisionLoss(String),
    #[error("invalid decimal literal: {0}")]
    Invalid(String),
}

/// Signed decimal with ≥20 significant digits, serialized as a JSON number.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse from a string losslessly.
    pub fn from_str_canonical(s: &str) -> Result<Self, DecimalError> {
        RustDecimal::from_str(s)
            .map(Decimal)
            .map_err(|_| DecimalError::Invalid(s.to_string()))
    }

    /// Convert from an `f64` the caller marked as exact.
    ///
    /// # Errors
    /// Returns `PrecisionLoss` when the float has no exact decimal image or
    /// does not round-trip.
    pub fn try_from_f64(value: f64) -> Result<Self, DecimalError> {
        let inner = RustDecimal::from_f64(value)
            .ok_or_else(|| DecimalError::PrecisionLoss(value.to_string()))?;
        match inner.to_f64() {
            Some(back) if back == value => Ok(Decimal(inner)),
            _ => Err(DecimalError::PrecisionLoss(value.to_string())),
        }
    }

    /// Format without exponent notation, trailing zeros trimmed.
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    pub fn one() -> Self {
        Decimal(RustDecimal::ONE)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    pub fn min(self, other: Self) -> Self {
        if self <= other {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Self) -> Self {
        if self >= other {
            self
        } else {
            other
        }
    }

    /// Division with `x / 0 = 0`.
    pub fn safe_div(self, rhs: Self) -> Self {
        if rhs.is_zero() {
            Decimal::zero()
        } else {
            Decimal(self.0 / rhs.0)
        }
    }

    fn round_half_up(self, scale: u32) -> Self {
        Decimal(
            self.0
                .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Round to the CAD monetary profile (scale 2, half-up).
    pub fn round_money(self) -> Self {
        self.round_half_up(MONEY_SCALE)
    }

    /// Round to the share-quantity profile (scale 6, half-up).
    pub fn round_shares(self) -> Self {
        self.round_half_up(SHARE_SCALE)
    }

    /// Round to the per-share display profile (scale 4, half-up).
    pub fn round_per_share(self) -> Self {
        self.round_half_up(PER_SHARE_SCALE)
    }

    /// Round to the FX-rate profile (scale 6, half-up).
    pub fn round_rate(self) -> Self {
        self.round_half_up(RATE_SCALE)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal(RustDecimal::from(value))
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}
