//! Per-transaction-type ACB algebra.
//!
//! `apply` is a pure function over an immutable series state and one event.
//! All costs and proceeds are converted to CAD at the event's FX rate before
//! entering the arithmetic; intermediates stay unrounded and only the values
//! destined for persisted fields go through the rounding profiles.

use super::{Applied, SeriesState};
use crate::domain::{AuditStep, AuditTrail, Decimal, Transaction, TransactionType};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlgebraError {
    #[error("insufficient shares: cannot dispose of {requested} with only {available} held")]
    InsufficientShares {
        requested: Decimal,
        available: Decimal,
    },
    #[error("invalid ratio: {0}")]
    InvalidRatio(Decimal),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Stored inputs of one event, detached from the persisted row.
#[derive(Debug, Clone, PartialEq)]
pub struct EventInputs {
    pub tx_type: TransactionType,
    pub quantity: Decimal,
    /// Per-share price in the security's currency. For `transfer_in` this is
    /// the per-share CAD ACB carried from the source account; for `drip` the
    /// dividend rate per pre-DRIP share.
    pub price: Decimal,
    /// CAD.
    pub fees: Decimal,
    /// CAD per unit of the security's currency.
    pub fx_rate: Decimal,
    pub ratio: Option<Decimal>,
    pub roc_per_share: Option<Decimal>,
    pub cash_per_share: Option<Decimal>,
    pub new_security_acb_percent: Option<Decimal>,
}

impl From<&Transaction> for EventInputs {
    fn from(tx: &Transaction) -> Self {
        EventInputs {
            tx_type: tx.tx_type,
            quantity: tx.quantity,
            price: tx.price,
            fees: tx.fees,
            fx_rate: tx.fx_rate,
            ratio: tx.ratio,
            roc_per_share: tx.roc_per_share,
            cash_per_share: tx.cash_per_share,
            new_security_acb_percent: tx.new_security_acb_percent,
        }
    }
}

impl EventInputs {
    /// Share-count effect of this event alone, ignoring ACB.
    ///
    /// Used by the superficial-loss detector to project holdings forward
    /// from stored inputs without touching possibly-stale snapshots.
    pub fn apply_to_shares(&self, shares: Decimal) -> Decimal {
        match self.tx_type {
            TransactionType::Buy | TransactionType::Drip | TransactionType::TransferIn => {
                (shares + self.quantity).round_shares()
            }
            TransactionType::Sell | TransactionType::TransferOut => {
                (shares - self.quantity).round_shares()
            }
            TransactionType::Split | TransactionType::Consolidation | TransactionType::Merger => {
                (shares * self.ratio.unwrap_or_else(Decimal::one)).round_shares()
            }
            TransactionType::Dividend | TransactionType::Roc | TransactionType::Spinoff => shares,
        }
    }
}

/// Apply one event to a series state.
///
/// Returns the successor state, the realized capital gain when the event
/// produces one, and the full audit trail of the computation.
pub fn apply(state: &SeriesState, ev: &EventInputs) -> Result<Applied, AlgebraError> {
    match ev.tx_type {
        TransactionType::Buy => apply_buy(state, ev),
        TransactionType::Sell => apply_sell(state, ev),
        TransactionType::Dividend => apply_dividend(state, ev),
        TransactionType::Drip => apply_drip(state, ev),
        TransactionType::Roc => apply_roc(state, ev),
        TransactionType::Split | TransactionType::Consolidation => apply_ratio_change(state, ev),
        TransactionType::Merger => apply_merger(state, ev),
        TransactionType::Spinoff => apply_spinoff(state, ev),
        TransactionType::TransferIn => apply_transfer_in(state, ev),
        TransactionType::TransferOut => apply_transfer_out(state, ev),
    }
}

fn require_ratio(ev: &EventInputs) -> Result<Decimal, AlgebraError> {
    let ratio = ev.ratio.ok_or(AlgebraError::MissingField("ratio"))?;
    if ratio <= Decimal::zero() {
        return Err(AlgebraError::InvalidRatio(ratio));
    }
    Ok(ratio)
}

fn check_disposable(state: &SeriesState, ev: &EventInputs) -> Result<(), AlgebraError> {
    if ev.quantity > state.shares {
        return Err(AlgebraError::InsufficientShares {
            requested: ev.quantity,
            available: state.shares,
        });
    }
    Ok(())
}

fn apply_buy(state: &SeriesState, ev: &EventInputs) -> Result<Applied, AlgebraError> {
    let cost_cad = ev.price * ev.quantity * ev.fx_rate;
    let total_cost = cost_cad + ev.fees;
    let shares_after = (state.shares + ev.quantity).round_shares();
    let acb_after = (state.total_acb + total_cost).round_money();

    let mut audit = AuditTrail::new("buy");
    audit.push(
        AuditStep::new("Purchase cost in CAD")
            .formula("price × quantity × fxRate")
            .value("price", ev.price)
            .value("quantity", ev.quantity)
            .value("fxRate", ev.fx_rate)
            .result(cost_cad),
    );
    audit.push(
        AuditStep::new("New total ACB")
            .formula("acbBefore + cost + fees")
            .value("acbBefore", state.total_acb)
            .value("cost", cost_cad)
            .value("fees", ev.fees)
            .result(acb_after),
    );
    audit.summary = format!(
        "Bought {} shares for {} CAD including fees; total ACB is now {}.",
        ev.quantity.to_canonical_string(),
        total_cost.round_money().to_canonical_string(),
        acb_after.to_canonical_string()
    );

    Ok(Applied {
        state: SeriesState::new(shares_after, acb_after),
        capital_gain: None,
        audit,
    })
}

fn apply_sell(state: &SeriesState, ev: &EventInputs) -> Result<Applied, AlgebraError> {
    check_disposable(state, ev)?;

    let acb_per_share = state.acb_per_share();
    let acb_used = acb_per_share * ev.quantity;
    let gross_proceeds = ev.price * ev.quantity * ev.fx_rate;
    let net_proceeds = gross_proceeds - ev.fees;
    let gain = (net_proceeds - acb_used).round_money();
    let shares_after = (state.shares - ev.quantity).round_shares();
    let acb_after = (state.total_acb - acb_used).round_money().max(Decimal::zero());

    let mut audit = AuditTrail::new("sell");
    audit.push(
        AuditStep::new("ACB per share")
            .formula("acbBefore / sharesBefore")
            .value("acbBefore", state.total_acb)
            .value("sharesBefore", state.shares)
            .result(acb_per_share.round_per_share()),
    );
    audit.push(
        AuditStep::new("ACB consumed by disposition")
            .formula("acbPerShare × quantity")
            .value("quantity", ev.quantity)
            .result(acb_used.round_money()),
    );
    audit.push(
        AuditStep::new("Net proceeds in CAD")
            .formula("price × quantity × fxRate − fees")
            .value("price", ev.price)
            .value("quantity", ev.quantity)
            .value("fxRate", ev.fx_rate)
            .value("fees", ev.fees)
            .result(net_proceeds.round_money()),
    );
    audit.push(
        AuditStep::new("Capital gain or loss")
            .formula("netProceeds − acbConsumed")
            .result(gain),
    );
    audit.summary = format!(
        "Sold {} shares for net proceeds of {} CAD realizing a {} of {}.",
        ev.quantity.to_canonical_string(),
        net_proceeds.round_money().to_canonical_string(),
        if gain.is_negative() { "loss" } else { "gain" },
        gain.abs().to_canonical_string()
    );

    Ok(Applied {
        state: SeriesState::new(shares_after, acb_after),
        capital_gain: Some(gain),
        audit,
    })
}

fn apply_dividend(state: &SeriesState, ev: &EventInputs) -> Result<Applied, AlgebraError> {
    let total_dividend = ev.price * state.shares * ev.fx_rate;

    let mut audit = AuditTrail::new("dividend");
    audit.push(
        AuditStep::new("Cash dividend in CAD (informational)")
            .formula("rate × sharesBefore × fxRate")
            .value("rate", ev.price)
            .value("sharesBefore", state.shares)
            .value("fxRate", ev.fx_rate)
            .result(total_dividend.round_money()),
    );
    audit.summary = format!(
        "Cash dividend of {} CAD; shares and ACB unchanged.",
        total_dividend.round_money().to_canonical_string()
    );

    Ok(Applied {
        state: *state,
        capital_gain: None,
        audit,
    })
}

fn apply_drip(state: &SeriesState, ev: &EventInputs) -> Result<Applied, AlgebraError> {
    let reinvested = ev.price * state.shares * ev.fx_rate;
    let addition = reinvested + ev.fees;
    let shares_after = (state.shares + ev.quantity).round_shares();
    let acb_after = (state.total_acb + addition).round_money();

    let mut audit = AuditTrail::new("drip");
    audit.push(
        AuditStep::new("Reinvested dividend in CAD")
            .formula("rate × sharesBefore × fxRate")
            .value("rate", ev.price)
            .value("sharesBefore", state.shares)
            .value("fxRate", ev.fx_rate)
            .result(reinvested.round_money()),
    );
    audit.push(
        AuditStep::new("New total ACB")
            .formula("acbBefore + reinvested + fees")
            .value("acbBefore", state.total_acb)
            .value("fees", ev.fees)
            .result(acb_after),
    );
    audit.summary = format!(
        "Reinvested a {} CAD dividend into {} new shares.",
        reinvested.round_money().to_canonical_string(),
        ev.quantity.to_canonical_string()
    );

    Ok(Applied {
        state: SeriesState::new(shares_after, acb_after),
        capital_gain: None,
        audit,
    })
}

fn apply_roc(state: &SeriesState, ev: &EventInputs) -> Result<Applied, AlgebraError> {
    let rate = ev
        .roc_per_share
        .ok_or(AlgebraError::MissingField("rocPerShare"))?;
    let total_roc = rate * state.shares * ev.fx_rate;

    let mut audit = AuditTrail::new("roc");
    audit.push(
        AuditStep::new("Return of capital in CAD")
            .formula("rocPerShare × sharesBefore × fxRate")
            .value("rocPerShare", rate)
            .value("sharesBefore", state.shares)
            .value("fxRate", ev.fx_rate)
            .result(total_roc.round_money()),
    );

    let (acb_after, gain) = if total_roc > state.total_acb {
        let excess = (total_roc - state.total_acb).round_money();
        audit.push(
            AuditStep::new("Distribution exceeds ACB; excess is an immediate capital gain")
                .formula("totalRoc − acbBefore")
                .value("acbBefore", state.total_acb)
                .result(excess),
        );
        (Decimal::zero(), Some(excess))
    } else {
        let acb_after = (state.total_acb - total_roc).round_money();
        audit.push(
            AuditStep::new("New total ACB")
                .formula("acbBefore − totalRoc")
                .value("acbBefore", state.total_acb)
                .result(acb_after),
        );
        (acb_after, None)
    };

    audit.summary = match gain {
        Some(excess) => format!(
            "Return of capital of {} CAD exhausted the ACB; {} CAD excess realized as a capital gain.",
            total_roc.round_money().to_canonical_string(),
            excess.to_canonical_string()
        ),
        None => format!(
            "Return of capital reduced ACB by {} CAD to {}.",
            total_roc.round_money().to_canonical_string(),
            acb_after.to_canonical_string()
        ),
    };

    Ok(Applied {
        state: SeriesState::new(state.shares, acb_after),
        capital_gain: gain,
        audit,
    })
}

fn apply_ratio_change(state: &SeriesState, ev: &EventInputs) -> Result<Applied, AlgebraError> {
    let ratio = require_ratio(ev)?;
    let shares_after = (state.shares * ratio).round_shares();
    let label = ev.tx_type.as_str();

    let mut audit = AuditTrail::new(label);
    audit.push(
        AuditStep::new("New share count")
            .formula("sharesBefore × ratio")
            .value("sharesBefore", state.shares)
            .value("ratio", ratio)
            .result(shares_after),
    );
    audit.summary = format!(
        "{} at ratio {} changed the share count from {} to {}; total ACB unchanged.",
        if ev.tx_type == TransactionType::Split {
            "Split"
        } else {
            "Consolidation"
        },
        ratio.to_canonical_string(),
        state.shares.to_canonical_string(),
        shares_after.to_canonical_string()
    );

    Ok(Applied {
        state: SeriesState::new(shares_after, state.total_acb),
        capital_gain: None,
        audit,
    })
}

fn apply_merger(state: &SeriesState, ev: &EventInputs) -> Result<Applied, AlgebraError> {
    let ratio = require_ratio(ev)?;
    let cash_per_share = ev.cash_per_share.unwrap_or_else(Decimal::zero);
    let new_shares = state.shares * ratio;
    let shares_after = new_shares.round_shares();
    let cash_total = cash_per_share * state.shares * ev.fx_rate;

    let mut audit = AuditTrail::new("merger");
    audit.push(
        AuditStep::new("New share count")
            .formula("sharesBefore × ratio")
            .value("sharesBefore", state.shares)
            .value("ratio", ratio)
            .result(shares_after),
    );

    if cash_total.is_zero() {
        audit.summary = format!(
            "Share-for-share merger at ratio {}; total ACB carried over unchanged.",
            ratio.to_canonical_string()
        );
        return Ok(Applied {
            state: SeriesState::new(shares_after, state.total_acb),
            capital_gain: None,
            audit,
        });
    }

    let stock_value = new_shares * ev.price * ev.fx_rate;
    let cash_proportion = cash_total.safe_div(cash_total + stock_value);
    let acb_out = state.total_acb * cash_proportion;
    let acb_after = (state.total_acb - acb_out).round_money();
    let gain = (cash_total - acb_out).round_money();

    audit.push(
        AuditStep::new("Cash consideration in CAD")
            .formula("cashPerShare × sharesBefore × fxRate")
            .value("cashPerShare", cash_per_share)
            .value("fxRate", ev.fx_rate)
            .result(cash_total.round_money()),
    );
    audit.push(
        AuditStep::new("Cash proportion of total consideration")
            .formula("cashTotal / (cashTotal + newShares × price × fxRate)")
            .value("stockValue", stock_value.round_money())
            .result(cash_proportion.round_rate()),
    );
    audit.push(
        AuditStep::new("Capital gain on cash portion")
            .formula("cashTotal − acbBefore × cashProportion")
            .value("acbBefore", state.total_acb)
            .result(gain),
    );
    audit.summary = format!(
        "Merger paid {} CAD cash alongside stock; realized gain of {} and remaining ACB {}.",
        cash_total.round_money().to_canonical_string(),
        gain.to_canonical_string(),
        acb_after.to_canonical_string()
    );

    Ok(Applied {
        state: SeriesState::new(shares_after, acb_after),
        capital_gain: Some(gain),
        audit,
    })
}

fn apply_spinoff(state: &SeriesState, ev: &EventInputs) -> Result<Applied, AlgebraError> {
    let percent = ev
        .new_security_acb_percent
        .ok_or(AlgebraError::MissingField("newSecurityAcbPercent"))?;
    let allocated = state.total_acb * percent;
    let acb_after = (state.total_acb - allocated).round_money();

    let mut audit = AuditTrail::new("spinoff");
    audit.push(
        AuditStep::new("ACB allocated to the spun-off security")
            .formula("acbBefore × newSecurityAcbPercent")
            .value("acbBefore", state.total_acb)
            .value("newSecurityAcbPercent", percent)
            .result(allocated.round_money()),
    );
    audit.push(
        AuditStep::new("Remaining ACB")
            .formula("acbBefore − allocated")
            .result(acb_after),
    );
    audit.summary = format!(
        "Spinoff moved {} CAD of ACB to the new security; {} remains on this position.",
        allocated.round_money().to_canonical_string(),
        acb_after.to_canonical_string()
    );

    Ok(Applied {
        state: SeriesState::new(state.shares, acb_after),
        capital_gain: None,
        audit,
    })
}

fn apply_transfer_in(state: &SeriesState, ev: &EventInputs) -> Result<Applied, AlgebraError> {
    // Price carries the per-share CAD ACB from the source account.
    let carried = ev.price * ev.quantity;
    let shares_after = (state.shares + ev.quantity).round_shares();
    let acb_after = (state.total_acb + carried).round_money();

    let mut audit = AuditTrail::new("transfer_in");
    audit.push(
        AuditStep::new("ACB carried in from the source account")
            .formula("acbPerShare × quantity")
            .value("acbPerShare", ev.price)
            .value("quantity", ev.quantity)
            .result(carried.round_money()),
    );
    audit.summary = format!(
        "Transferred in {} shares carrying {} CAD of ACB.",
        ev.quantity.to_canonical_string(),
        carried.round_money().to_canonical_string()
    );

    Ok(Applied {
        state: SeriesState::new(shares_after, acb_after),
        capital_gain: None,
        audit,
    })
}

fn apply_transfer_out(state: &SeriesState, ev: &EventInputs) -> Result<Applied, AlgebraError> {
    check_disposable(state, ev)?;

    let acb_per_share = state.acb_per_share();
    let acb_out = acb_per_share * ev.quantity;
    let shares_after = (state.shares - ev.quantity).round_shares();
    let acb_after = (state.total_acb - acb_out).round_money().max(Decimal::zero());

    let mut audit = AuditTrail::new("transfer_out");
    audit.push(
        AuditStep::new("ACB leaving with the transferred shares")
            .formula("acbBefore / sharesBefore × quantity")
            .value("acbBefore", state.total_acb)
            .value("sharesBefore", state.shares)
            .value("quantity", ev.quantity)
            .result(acb_out.round_money()),
    );
    audit.summary = format!(
        "Transferred out {} shares carrying {} CAD of ACB; no gain realized.",
        ev.quantity.to_canonical_string(),
        acb_out.round_money().to_canonical_string()
    );

    Ok(Applied {
        state: SeriesState::new(shares_after, acb_after),
        capital_gain: None,
        audit,
    })
}
