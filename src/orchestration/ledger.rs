//! Ledger orchestrator: owns the mutating lifecycle of transactions and the
//! chain-continuity invariant of every (security, account) series.
//!
//! Every mutation replays the affected suffix inside one store transaction:
//! either all writes (row, replayed suffix, position cache) commit, or none
//! do. FX resolution is the only outside I/O and happens before the
//! per-series lock is taken.

use crate::db::{NewTransactionRow, Repository};
use crate::domain::{
    Account, AccountId, AuditStep, Decimal, Security, SecurityId, TimestampMs, Transaction,
    TransactionFlag, TransactionId, TransactionType,
};
use crate::engine::{
    algebra, superficial_window, review_loss, AlgebraError, EventInputs, SellContext, SeriesState,
    WindowAcquisition, SUPERFICIAL_WINDOW_DAYS,
};
use crate::fx::{FxError, FxOracle};
use crate::orchestration::locks::SeriesLocks;
use chrono::{Days, NaiveDate};
use sqlx::sqlite::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Algebra(#[from] AlgebraError),
    #[error("FX rate unavailable: {0}")]
    FxUnavailable(String),
    #[error(transparent)]
    Persistence(#[from] sqlx::Error),
    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),
}

impl From<FxError> for LedgerError {
    fn from(err: FxError) -> Self {
        LedgerError::FxUnavailable(err.to_string())
    }
}

/// Input for creating a transaction.
#[derive(Debug, Clone)]
pub struct CreateTransactionInput {
    pub security_id: SecurityId,
    pub account_id: AccountId,
    pub trade_date: NaiveDate,
    /// Defaults to the trade date.
    pub settlement_date: Option<NaiveDate>,
    pub tx_type: TransactionType,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fees: Decimal,
    /// When absent, resolved from the FX oracle (1 for CAD securities).
    pub fx_rate: Option<Decimal>,
    pub ratio: Option<Decimal>,
    pub roc_per_share: Option<Decimal>,
    pub cash_per_share: Option<Decimal>,
    pub new_security_acb_percent: Option<Decimal>,
    pub new_security_id: Option<SecurityId>,
    pub broker: Option<String>,
    pub external_id: Option<String>,
    pub notes: Option<String>,
}

/// Field-level patch for `update`; absent fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub security_id: Option<SecurityId>,
    pub account_id: Option<AccountId>,
    pub trade_date: Option<NaiveDate>,
    pub settlement_date: Option<NaiveDate>,
    pub tx_type: Option<TransactionType>,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub fees: Option<Decimal>,
    pub fx_rate: Option<Decimal>,
    pub ratio: Option<Decimal>,
    pub roc_per_share: Option<Decimal>,
    pub cash_per_share: Option<Decimal>,
    pub new_security_acb_percent: Option<Decimal>,
    pub new_security_id: Option<SecurityId>,
    pub broker: Option<String>,
    pub external_id: Option<String>,
    pub notes: Option<String>,
}

pub struct LedgerService {
    repo: Arc<Repository>,
    oracle: Arc<dyn FxOracle>,
    locks: SeriesLocks,
    fx_timeout: Duration,
}

impl LedgerService {
    pub fn new(repo: Arc<Repository>, oracle: Arc<dyn FxOracle>, fx_timeout: Duration) -> Self {
        LedgerService {
            repo,
            oracle,
            locks: SeriesLocks::new(),
            fx_timeout,
        }
    }

    /// Create a transaction and recalculate the affected suffix.
    pub async fn create(&self, input: CreateTransactionInput) -> Result<Transaction, LedgerError> {
        validate_input(&input)?;

        let security = self
            .repo
            .get_security(input.security_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("security {}", input.security_id)))?;
        let account = self
            .repo
            .get_account(input.account_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", input.account_id)))?;

        let spinoff_target = match (input.tx_type, input.new_security_id) {
            (TransactionType::Spinoff, Some(new_security_id)) => Some(
                self.repo
                    .get_security(new_security_id)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::NotFound(format!("security {}", new_security_id))
                    })?,
            ),
            _ => None,
        };

        if let Some(external_id) = input.external_id.as_deref() {
            if self.repo.external_id_exists(external_id).await? {
                return Err(LedgerError::Validation(format!(
                    "a transaction with external id {} already exists",
                    external_id
                )));
            }
        }

        let settlement_date = input.settlement_date.unwrap_or(input.trade_date);
        let fx_rate = self
            .resolve_fx(input.fx_rate, &security, settlement_date)
            .await?;

        let mut lock_keys = vec![(input.security_id, input.account_id)];
        if let Some(target) = &spinoff_target {
            lock_keys.push((target.id, input.account_id));
        }
        let _guards = self.locks.acquire(lock_keys).await;

        let mut tx = self.repo.begin().await?;
        let row = NewTransactionRow {
            security_id: input.security_id,
            account_id: input.account_id,
            trade_date: input.trade_date,
            settlement_date,
            created_at_ms: TimestampMs::now(),
            tx_type: input.tx_type,
            quantity: input.quantity.round_shares(),
            price: input.price,
            fees: input.fees.round_money(),
            fx_rate: fx_rate.round_rate(),
            ratio: input.ratio,
            roc_per_share: input.roc_per_share,
            cash_per_share: input.cash_per_share,
            new_security_acb_percent: input.new_security_acb_percent,
            new_security_id: input.new_security_id,
            broker: input.broker,
            external_id: input.external_id,
            notes: input.notes,
        };
        let id = Repository::insert_transaction(&mut tx, &row).await?;

        self.replay(&mut tx, input.security_id, &account, input.trade_date)
            .await?;

        if let Some(target) = &spinoff_target {
            self.pair_spinoff(&mut tx, id, &security, target, &account)
                .await?;
        }

        tx.commit().await?;
        info!(transaction = %id, security = %input.security_id, account = %input.account_id, "transaction created");

        self.repo
            .get_transaction(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", id)))
    }

    /// Update a transaction: delete-then-create with merged fields inside one
    /// store transaction. The creation timestamp is preserved so an edit does
    /// not shuffle same-day ordering.
    pub async fn update(
        &self,
        id: TransactionId,
        patch: TransactionPatch,
    ) -> Result<Transaction, LedgerError> {
        let existing = self
            .repo
            .get_transaction(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", id)))?;

        let merged = CreateTransactionInput {
            security_id: patch.security_id.unwrap_or(existing.security_id),
            account_id: patch.account_id.unwrap_or(existing.account_id),
            trade_date: patch.trade_date.unwrap_or(existing.trade_date),
            settlement_date: Some(patch.settlement_date.unwrap_or(existing.settlement_date)),
            tx_type: patch.tx_type.unwrap_or(existing.tx_type),
            quantity: patch.quantity.unwrap_or(existing.quantity),
            price: patch.price.unwrap_or(existing.price),
            fees: patch.fees.unwrap_or(existing.fees),
            fx_rate: Some(patch.fx_rate.unwrap_or(existing.fx_rate)),
            ratio: patch.ratio.or(existing.ratio),
            roc_per_share: patch.roc_per_share.or(existing.roc_per_share),
            cash_per_share: patch.cash_per_share.or(existing.cash_per_share),
            new_security_acb_percent: patch
                .new_security_acb_percent
                .or(existing.new_security_acb_percent),
            new_security_id: patch.new_security_id.or(existing.new_security_id),
            broker: patch.broker.or_else(|| existing.broker.clone()),
            external_id: patch.external_id.or_else(|| existing.external_id.clone()),
            notes: patch.notes.or_else(|| existing.notes.clone()),
        };
        validate_input(&merged)?;

        let security = self
            .repo
            .get_security(merged.security_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("security {}", merged.security_id)))?;
        let account = self
            .repo
            .get_account(merged.account_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", merged.account_id)))?;
        let old_account = if merged.account_id == existing.account_id {
            account.clone()
        } else {
            self.repo
                .get_account(existing.account_id)
                .await?
                .ok_or_else(|| {
                    LedgerError::NotFound(format!("account {}", existing.account_id))
                })?
        };

        if let Some(external_id) = merged.external_id.as_deref() {
            if existing.external_id.as_deref() != Some(external_id)
                && self.repo.external_id_exists(external_id).await?
            {
                return Err(LedgerError::Validation(format!(
                    "a transaction with external id {} already exists",
                    external_id
                )));
            }
        }

        let settlement_date = merged.settlement_date.unwrap_or(merged.trade_date);
        let fx_rate = self
            .resolve_fx(merged.fx_rate, &security, settlement_date)
            .await?;

        let old_series = (existing.security_id, existing.account_id);
        let new_series = (merged.security_id, merged.account_id);
        let _guards = self.locks.acquire(vec![old_series, new_series]).await;

        let mut tx = self.repo.begin().await?;
        Repository::delete_transaction(&mut tx, id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", id)))?;

        let row = NewTransactionRow {
            security_id: merged.security_id,
            account_id: merged.account_id,
            trade_date: merged.trade_date,
            settlement_date,
            created_at_ms: existing.created_at_ms,
            tx_type: merged.tx_type,
            quantity: merged.quantity.round_shares(),
            price: merged.price,
            fees: merged.fees.round_money(),
            fx_rate: fx_rate.round_rate(),
            ratio: merged.ratio,
            roc_per_share: merged.roc_per_share,
            cash_per_share: merged.cash_per_share,
            new_security_acb_percent: merged.new_security_acb_percent,
            new_security_id: merged.new_security_id,
            broker: merged.broker,
            external_id: merged.external_id,
            notes: merged.notes,
        };
        let new_id = Repository::insert_transaction(&mut tx, &row).await?;

        if old_series == new_series {
            let from = existing.trade_date.min(merged.trade_date);
            self.replay(&mut tx, merged.security_id, &account, from).await?;
        } else {
            self.replay(&mut tx, existing.security_id, &old_account, existing.trade_date)
                .await?;
            self.replay(&mut tx, merged.security_id, &account, merged.trade_date)
                .await?;
        }

        tx.commit().await?;
        info!(transaction = %new_id, previous = %id, "transaction updated");

        self.repo
            .get_transaction(new_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", new_id)))
    }

    /// Delete a transaction and recalculate the affected suffix. Returns the
    /// deleted row as it was last persisted.
    pub async fn delete(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        let existing = self
            .repo
            .get_transaction(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", id)))?;
        let account = self
            .repo
            .get_account(existing.account_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", existing.account_id)))?;

        let _guards = self
            .locks
            .acquire(vec![(existing.security_id, existing.account_id)])
            .await;

        let mut tx = self.repo.begin().await?;
        Repository::delete_transaction(&mut tx, id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", id)))?;
        self.replay(&mut tx, existing.security_id, &account, existing.trade_date)
            .await?;
        tx.commit().await?;

        info!(transaction = %id, "transaction deleted");
        Ok(existing)
    }

    async fn resolve_fx(
        &self,
        supplied: Option<Decimal>,
        security: &Security,
        settlement_date: NaiveDate,
    ) -> Result<Decimal, LedgerError> {
        if let Some(rate) = supplied {
            return Ok(rate);
        }
        if security.currency.is_cad() {
            return Ok(Decimal::one());
        }

        let cad = crate::domain::Currency::cad();
        match tokio::time::timeout(
            self.fx_timeout,
            self.oracle.rate(settlement_date, &security.currency, &cad),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(LedgerError::FxUnavailable(format!(
                "oracle exceeded the {}ms deadline for {}/CAD on {}",
                self.fx_timeout.as_millis(),
                security.currency,
                settlement_date
            ))),
        }
    }

    /// Replay a series from `from` (widened 30 days back so loss sells whose
    /// window covers the mutation are re-reviewed), restoring chain
    /// continuity and the position cache.
    async fn replay(
        &self,
        conn: &mut SqliteConnection,
        security_id: SecurityId,
        account: &Account,
        from: NaiveDate,
    ) -> Result<(), LedgerError> {
        let effective_from = from - Days::new(SUPERFICIAL_WINDOW_DAYS);
        let seed = Repository::find_prev_before(conn, security_id, account.id, effective_from)
            .await?
            .map(|prev| SeriesState::new(prev.shares_after, prev.acb_after))
            .unwrap_or_else(SeriesState::opening);

        let rows = Repository::find_suffix(conn, security_id, account.id, effective_from).await?;
        debug!(
            security = %security_id,
            account = %account.id,
            from = %effective_from,
            rows = rows.len(),
            "replaying series suffix"
        );

        let mut state = seed;
        // Denied-loss ACB additions waiting for their repurchase row.
        let mut pending: HashMap<i64, Decimal> = HashMap::new();

        for (idx, row) in rows.iter().enumerate() {
            let inputs = EventInputs::from(row);
            let applied = algebra::apply(&state, &inputs)?;
            let mut audit = applied.audit;
            let mut acb_after = applied.state.total_acb;
            let shares_after = applied.state.shares;
            let mut capital_gain = applied.capital_gain;
            let mut flags: Vec<TransactionFlag> = Vec::new();

            if let Some(addition) = pending.remove(&row.id.as_i64()) {
                let bumped = (acb_after + addition).round_money();
                audit.push(
                    AuditStep::new("Denied superficial loss added to ACB")
                        .formula("acbAfter + deniedLoss")
                        .value("deniedLoss", addition)
                        .result(bumped),
                );
                acb_after = bumped;
            }

            if row.tx_type == TransactionType::Sell {
                if let Some(gain) = capital_gain {
                    if gain.is_negative() {
                        let review = self
                            .review_sell(conn, row, &rows[idx + 1..], shares_after, gain, account)
                            .await?;
                        if review.review.is_superficial {
                            flags.push(TransactionFlag::SuperficialLoss);
                            for (target, amount) in &review.adjustments {
                                let entry =
                                    pending.entry(target.as_i64()).or_insert_with(Decimal::zero);
                                *entry = *entry + *amount;
                            }
                        }
                        audit.superficial_loss = Some(review.review);
                    }
                }
            }

            if account.is_registered() && capital_gain.is_some() {
                audit.push(AuditStep::new(
                    "Registered account: disposition is not a reportable capital gain",
                ));
                capital_gain = None;
            }

            Repository::write_recalculation(
                conn,
                row.id,
                state.shares,
                shares_after,
                state.total_acb,
                acb_after,
                capital_gain,
                &flags,
                &audit,
            )
            .await?;

            state = SeriesState::new(shares_after, acb_after);
            if state.shares.is_negative() || state.total_acb.is_negative() {
                return Err(LedgerError::InvariantViolation(format!(
                    "negative state after transaction {}: shares {}, acb {}",
                    row.id, state.shares, state.total_acb
                )));
            }
        }

        Repository::upsert_position(conn, security_id, account.id, state.shares, state.total_acb)
            .await?;
        Ok(())
    }

    /// Gather detector inputs for a loss-producing sell and run the review.
    ///
    /// The held-after-window test uses stored inputs only: the sell's own
    /// series is projected forward share-wise through the remaining suffix
    /// rows, and other series of the security contribute their stored
    /// terminal shares at the window end.
    async fn review_sell(
        &self,
        conn: &mut SqliteConnection,
        sell: &Transaction,
        remaining: &[Transaction],
        shares_after_sell: Decimal,
        gain: Decimal,
        account: &Account,
    ) -> Result<crate::engine::LossReview, LedgerError> {
        let (window_start, window_end) = superficial_window(sell.trade_date);

        let acquisitions: Vec<WindowAcquisition> =
            Repository::find_window_acquisitions(conn, sell.security_id, window_start, window_end)
                .await?
                .iter()
                .filter(|t| t.id != sell.id)
                .map(|t| WindowAcquisition {
                    id: t.id,
                    account_id: t.account_id,
                    trade_date: t.trade_date,
                    created_at_ms: t.created_at_ms.as_i64(),
                    quantity: t.quantity,
                })
                .collect();

        let mut own_shares = shares_after_sell;
        for row in remaining {
            if row.trade_date > window_end {
                break;
            }
            own_shares = EventInputs::from(row).apply_to_shares(own_shares);
        }
        let other_shares =
            Repository::other_series_shares_at(conn, sell.security_id, sell.account_id, window_end)
                .await?;
        let held_after_window = own_shares + other_shares;

        let context = SellContext {
            id: sell.id,
            account_id: sell.account_id,
            trade_date: sell.trade_date,
            created_at_ms: sell.created_at_ms.as_i64(),
            quantity_sold: sell.quantity,
            loss: gain,
            account_registered: account.is_registered(),
        };
        Ok(review_loss(&context, &acquisitions, held_after_window))
    }

    /// Create the synthetic `transfer_in` that opens the spun-off series.
    async fn pair_spinoff(
        &self,
        conn: &mut SqliteConnection,
        spinoff_id: TransactionId,
        security: &Security,
        target: &Security,
        account: &Account,
    ) -> Result<(), LedgerError> {
        let spinoff = Repository::fetch_transaction(conn, spinoff_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {}", spinoff_id)))?;
        if !spinoff.quantity.is_positive() {
            return Ok(());
        }

        let percent = spinoff
            .new_security_acb_percent
            .ok_or(AlgebraError::MissingField("newSecurityAcbPercent"))?;
        let allocated = (spinoff.acb_before * percent).round_money();
        let per_share = allocated.safe_div(spinoff.quantity);

        let row = NewTransactionRow {
            security_id: target.id,
            account_id: account.id,
            trade_date: spinoff.trade_date,
            settlement_date: spinoff.settlement_date,
            created_at_ms: TimestampMs::now(),
            tx_type: TransactionType::TransferIn,
            quantity: spinoff.quantity,
            price: per_share,
            fees: Decimal::zero(),
            fx_rate: Decimal::one(),
            ratio: None,
            roc_per_share: None,
            cash_per_share: None,
            new_security_acb_percent: None,
            new_security_id: None,
            broker: None,
            external_id: None,
            notes: Some(format!(
                "ACB of {} CAD allocated from spinoff of {}",
                allocated.to_canonical_string(),
                security.symbol
            )),
        };
        Repository::insert_transaction(conn, &row).await?;
        self.replay(conn, target.id, account, spinoff.trade_date)
            .await?;
        Ok(())
    }
}

fn validate_input(input: &CreateTransactionInput) -> Result<(), LedgerError> {
    if input.quantity.is_negative() {
        return Err(LedgerError::Validation(
            "quantity cannot be negative".to_string(),
        ));
    }
    if input.price.is_negative() {
        return Err(LedgerError::Validation(
            "price cannot be negative".to_string(),
        ));
    }
    if input.fees.is_negative() {
        return Err(LedgerError::Validation(
            "fees cannot be negative".to_string(),
        ));
    }
    if let Some(rate) = input.fx_rate {
        if !rate.is_positive() {
            return Err(LedgerError::Validation(
                "fxRate must be positive".to_string(),
            ));
        }
    }

    match input.tx_type {
        TransactionType::Buy
        | TransactionType::Sell
        | TransactionType::Drip
        | TransactionType::TransferIn
        | TransactionType::TransferOut => {
            if !input.quantity.is_positive() {
                return Err(LedgerError::Validation(format!(
                    "quantity must be positive for a {} transaction",
                    input.tx_type
                )));
            }
        }
        TransactionType::Roc => {
            let rate = input.roc_per_share.ok_or_else(|| {
                LedgerError::Validation("rocPerShare is required for roc".to_string())
            })?;
            if rate.is_negative() {
                return Err(LedgerError::Validation(
                    "rocPerShare cannot be negative".to_string(),
                ));
            }
        }
        TransactionType::Split | TransactionType::Consolidation | TransactionType::Merger => {
            if input.ratio.is_none() {
                return Err(LedgerError::Validation(format!(
                    "ratio is required for {}",
                    input.tx_type
                )));
            }
        }
        TransactionType::Spinoff => {
            let percent = input.new_security_acb_percent.ok_or_else(|| {
                LedgerError::Validation(
                    "newSecurityAcbPercent is required for spinoff".to_string(),
                )
            })?;
            if percent.is_negative() || percent > Decimal::one() {
                return Err(LedgerError::Validation(
                    "newSecurityAcbPercent must be between 0 and 1".to_string(),
                ));
            }
        }
        TransactionType::Dividend => {}
    }

    Ok(())
}
