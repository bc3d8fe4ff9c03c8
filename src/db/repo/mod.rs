//! Repository layer for database operations.
//!
//! Methods are organized across submodules by domain:
//! - `catalog.rs` - securities and accounts
//! - `transactions.rs` - ledger rows and series queries
//! - `positions.rs` - the derived position cache
//! - `fx_rates.rs` - FX observations
//!
//! Reads go through the pool. Ledger mutations and the queries replay relies
//! on take an explicit `&mut SqliteConnection` so that every write of one
//! orchestrator call shares a single transaction.

mod catalog;
mod fx_rates;
mod positions;
mod transactions;

pub use catalog::{NewAccount, NewSecurity};
pub use positions::PositionRow;
pub use transactions::NewTransactionRow;

use crate::domain::{
    AccountId, AuditTrail, Decimal, SecurityId, TimestampMs, Transaction, TransactionFlag,
    TransactionId, TransactionType,
};
use chrono::NaiveDate;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a store transaction for one orchestrator operation.
    pub async fn begin(&self) -> Result<sqlx::Transaction<'_, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }
}

fn parse_decimal(field: &str, value: &str) -> Decimal {
    Decimal::from_str_canonical(value).unwrap_or_else(|e| {
        warn!(field = field, value = value, error = %e, "Failed to parse stored decimal, using zero");
        Decimal::zero()
    })
}

fn parse_opt_decimal(field: &str, value: Option<String>) -> Option<Decimal> {
    value.map(|v| parse_decimal(field, &v))
}

fn parse_date(field: &str, value: &str) -> NaiveDate {
    NaiveDate::from_str(value).unwrap_or_else(|e| {
        warn!(field = field, value = value, error = %e, "Failed to parse stored date, using epoch");
        NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
    })
}

fn parse_flags(value: &str) -> Vec<TransactionFlag> {
    value
        .split(';')
        .filter(|s| !s.is_empty())
        .filter_map(|s| match TransactionFlag::from_str(s) {
            Ok(flag) => Some(flag),
            Err(e) => {
                warn!(value = s, error = %e, "Unknown stored flag, dropping");
                None
            }
        })
        .collect()
}

pub(crate) fn encode_flags(flags: &[TransactionFlag]) -> String {
    flags
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

fn parse_audit(value: Option<String>) -> Option<AuditTrail> {
    value.and_then(|json| match serde_json::from_str(&json) {
        Ok(audit) => Some(audit),
        Err(e) => {
            warn!(error = %e, "Failed to parse stored calculation details, dropping");
            None
        }
    })
}

fn row_to_transaction(row: &SqliteRow) -> Transaction {
    let tx_type_str: String = row.get("tx_type");
    let tx_type = TransactionType::from_str(&tx_type_str).unwrap_or_else(|e| {
        warn!(value = %tx_type_str, error = %e, "Unknown stored transaction type, defaulting to buy");
        TransactionType::Buy
    });

    Transaction {
        id: TransactionId::new(row.get("id")),
        security_id: SecurityId::new(row.get("security_id")),
        account_id: AccountId::new(row.get("account_id")),
        trade_date: parse_date("trade_date", &row.get::<String, _>("trade_date")),
        settlement_date: parse_date("settlement_date", &row.get::<String, _>("settlement_date")),
        created_at_ms: TimestampMs::new(row.get("created_at_ms")),
        tx_type,
        quantity: parse_decimal("quantity", &row.get::<String, _>("quantity")),
        price: parse_decimal("price", &row.get::<String, _>("price")),
        fees: parse_decimal("fees", &row.get::<String, _>("fees")),
        fx_rate: parse_decimal("fx_rate", &row.get::<String, _>("fx_rate")),
        ratio: parse_opt_decimal("ratio", row.get("ratio")),
        roc_per_share: parse_opt_decimal("roc_per_share", row.get("roc_per_share")),
        cash_per_share: parse_opt_decimal("cash_per_share", row.get("cash_per_share")),
        new_security_acb_percent: parse_opt_decimal(
            "new_security_acb_percent",
            row.get("new_security_acb_percent"),
        ),
        new_security_id: row
            .get::<Option<i64>, _>("new_security_id")
            .map(SecurityId::new),
        broker: row.get("broker"),
        external_id: row.get("external_id"),
        notes: row.get("notes"),
        shares_before: parse_decimal("shares_before", &row.get::<String, _>("shares_before")),
        shares_after: parse_decimal("shares_after", &row.get::<String, _>("shares_after")),
        acb_before: parse_decimal("acb_before", &row.get::<String, _>("acb_before")),
        acb_after: parse_decimal("acb_after", &row.get::<String, _>("acb_after")),
        capital_gain: parse_opt_decimal("capital_gain", row.get("capital_gain")),
        flags: parse_flags(&row.get::<String, _>("flags")),
        calculation_details: parse_audit(row.get("calculation_details")),
    }
}

pub(crate) const TRANSACTION_COLUMNS: &str = "id, security_id, account_id, trade_date, settlement_date, created_at_ms, tx_type, \
     quantity, price, fees, fx_rate, ratio, roc_per_share, cash_per_share, \
     new_security_acb_percent, new_security_id, broker, external_id, notes, \
     shares_before, shares_after, acb_before, acb_after, capital_gain, flags, calculation_details";
