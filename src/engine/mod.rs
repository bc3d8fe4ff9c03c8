//! Pure computation engine for the deterministic ledger logic.

use crate::domain::{AuditTrail, Decimal};

pub mod algebra;
pub mod superficial;

pub use algebra::{apply, AlgebraError, EventInputs};
pub use superficial::{
    review_loss, superficial_window, LossReview, SellContext, WindowAcquisition,
    SUPERFICIAL_WINDOW_DAYS,
};

/// Running state of one (security, account) series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeriesState {
    /// Shares held, scale 6, never negative.
    pub shares: Decimal,
    /// Total adjusted cost base in CAD, scale 2, never negative.
    pub total_acb: Decimal,
}

impl SeriesState {
    /// Opening state of an empty series.
    pub fn opening() -> Self {
        SeriesState {
            shares: Decimal::zero(),
            total_acb: Decimal::zero(),
        }
    }

    pub fn new(shares: Decimal, total_acb: Decimal) -> Self {
        SeriesState { shares, total_acb }
    }

    /// Unrounded ACB per share; zero for an empty position.
    pub fn acb_per_share(&self) -> Decimal {
        self.total_acb.safe_div(self.shares)
    }
}

/// Result of applying one event to a series state.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub state: SeriesState,
    /// Realized capital gain or loss in CAD, when the event produces one.
    pub capital_gain: Option<Decimal>,
    pub audit: AuditTrail,
}
