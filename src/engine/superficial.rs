//! Superficial-loss detection under the CRA ±30-day rule.
//!
//! The detector is pure: the orchestrator gathers the in-window acquisitions
//! and the held-after-window share count, and this module decides whether the
//! loss is denied, how much, and where the denied amount is added back.

use crate::domain::{AccountId, Decimal, SuperficialLossReview, TransactionId};
use chrono::{Days, NaiveDate};

/// Calendar days on each side of the sale date.
pub const SUPERFICIAL_WINDOW_DAYS: u64 = 30;

/// Inclusive `[D−30, D+30]` window around a trade date.
pub fn superficial_window(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    (
        date - Days::new(SUPERFICIAL_WINDOW_DAYS),
        date + Days::new(SUPERFICIAL_WINDOW_DAYS),
    )
}

/// The loss-producing sell under review.
#[derive(Debug, Clone)]
pub struct SellContext {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub trade_date: NaiveDate,
    pub created_at_ms: i64,
    pub quantity_sold: Decimal,
    /// Realized capital loss, negative.
    pub loss: Decimal,
    pub account_registered: bool,
}

impl SellContext {
    fn ordering_key(&self) -> (NaiveDate, i64, i64) {
        (self.trade_date, self.created_at_ms, self.id.as_i64())
    }
}

/// An acquiring event (`buy` or `drip`) of the same security inside the
/// window, from any account.
#[derive(Debug, Clone)]
pub struct WindowAcquisition {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub trade_date: NaiveDate,
    pub created_at_ms: i64,
    pub quantity: Decimal,
}

impl WindowAcquisition {
    fn ordering_key(&self) -> (NaiveDate, i64, i64) {
        (self.trade_date, self.created_at_ms, self.id.as_i64())
    }
}

/// Detector verdict plus the ACB additions the orchestrator writes back.
#[derive(Debug, Clone)]
pub struct LossReview {
    pub review: SuperficialLossReview,
    /// `(repurchase id, CAD addition)` in series order; the parts sum to the
    /// denied amount exactly.
    pub adjustments: Vec<(TransactionId, Decimal)>,
}

fn allowed(explanation: String) -> LossReview {
    LossReview {
        review: SuperficialLossReview {
            is_superficial: false,
            loss_amount: Decimal::zero(),
            related_transaction_ids: Vec::new(),
            explanation,
            adjustment_required: String::new(),
        },
        adjustments: Vec::new(),
    }
}

/// Decide whether a realized loss is superficial.
///
/// All three legs must hold: the account is not registered, an acquiring
/// event of the security falls inside the window, and a share is still held
/// 30 days after the sale. The denied amount follows the proportional rule
/// `|loss| · min(reacquired, sold) / sold`, and is distributed across the
/// same-account acquisitions that follow the sell, prorated by quantity.
pub fn review_loss(
    sell: &SellContext,
    acquisitions: &[WindowAcquisition],
    shares_held_after_window: Decimal,
) -> LossReview {
    if sell.account_registered {
        return allowed(
            "Sale occurred in a registered account; the superficial loss rule does not apply."
                .to_string(),
        );
    }

    let in_window: Vec<&WindowAcquisition> = acquisitions
        .iter()
        .filter(|a| a.id != sell.id)
        .collect();
    if in_window.is_empty() {
        return allowed(
            "No acquisition of this security within 30 days before or after the sale; the loss is claimable."
                .to_string(),
        );
    }

    if !shares_held_after_window.is_positive() {
        return allowed(
            "No shares of this security remained held 30 days after the sale; the loss is claimable."
                .to_string(),
        );
    }

    let reacquired: Decimal = in_window
        .iter()
        .fold(Decimal::zero(), |acc, a| acc + a.quantity);
    let denied = (sell.loss.abs() * reacquired.min(sell.quantity_sold))
        .safe_div(sell.quantity_sold)
        .round_money();

    let related: Vec<TransactionId> = in_window.iter().map(|a| a.id).collect();

    // ACB additions go to the repurchases in this account that sort after
    // the sell, ascending, prorated by quantity. The last allocation absorbs
    // the rounding remainder so the parts sum to the denied amount exactly.
    let mut later: Vec<&WindowAcquisition> = in_window
        .iter()
        .filter(|a| a.account_id == sell.account_id && a.ordering_key() > sell.ordering_key())
        .copied()
        .collect();
    later.sort_by_key(|a| a.ordering_key());

    let later_quantity: Decimal = later
        .iter()
        .fold(Decimal::zero(), |acc, a| acc + a.quantity);
    let mut adjustments: Vec<(TransactionId, Decimal)> = Vec::with_capacity(later.len());
    let mut allocated = Decimal::zero();
    for (i, acquisition) in later.iter().enumerate() {
        let amount = if i + 1 == later.len() {
            denied - allocated
        } else {
            (denied * acquisition.quantity)
                .safe_div(later_quantity)
                .round_money()
        };
        allocated = allocated + amount;
        adjustments.push((acquisition.id, amount));
    }

    let (window_start, window_end) = superficial_window(sell.trade_date);
    let explanation = format!(
        "{} of the {} shares sold were reacquired between {} and {} and the position was still held 30 days after the sale; {} CAD of the loss is denied.",
        reacquired.min(sell.quantity_sold).to_canonical_string(),
        sell.quantity_sold.to_canonical_string(),
        window_start,
        window_end,
        denied.to_canonical_string()
    );
    let adjustment_required = if adjustments.is_empty() {
        format!(
            "Add {} CAD to the adjusted cost base of the reacquired shares; the reacquisitions are outside this account, so no automatic adjustment was written.",
            denied.to_canonical_string()
        )
    } else {
        format!(
            "{} CAD added to the adjusted cost base of {} subsequent repurchase(s) in this account.",
            denied.to_canonical_string(),
            adjustments.len()
        )
    };

    LossReview {
        review: SuperficialLossReview {
            is_superficial: true,
            loss_amount: denied,
            related_transaction_ids: related,
            explanation,
            adjustment_required,
        },
        adjustments,
    }
}
