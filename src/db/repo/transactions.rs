//! Ledger-row storage and the series queries replay depends on.
//!
//! The mutating operations and every query the orchestrator issues while
//! recalculating take an explicit connection so they observe the uncommitted
//! writes of the surrounding store transaction.

use super::{encode_flags, row_to_transaction, Repository, TRANSACTION_COLUMNS};
use crate::domain::{
    AccountId, AuditTrail, Decimal, SecurityId, TimestampMs, Transaction, TransactionFlag,
    TransactionId, TransactionType,
};
use chrono::NaiveDate;
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

/// Stored inputs of a new ledger row; snapshots start zeroed and are filled
/// in by replay.
#[derive(Debug, Clone)]
pub struct NewTransactionRow {
    pub security_id: SecurityId,
    pub account_id: AccountId,
    pub trade_date: NaiveDate,
    pub settlement_date: NaiveDate,
    pub created_at_ms: TimestampMs,
    pub tx_type: TransactionType,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fees: Decimal,
    pub fx_rate: Decimal,
    pub ratio: Option<Decimal>,
    pub roc_per_share: Option<Decimal>,
    pub cash_per_share: Option<Decimal>,
    pub new_security_acb_percent: Option<Decimal>,
    pub new_security_id: Option<SecurityId>,
    pub broker: Option<String>,
    pub external_id: Option<String>,
    pub notes: Option<String>,
}

impl Repository {
    pub async fn insert_transaction(
        conn: &mut SqliteConnection,
        row: &NewTransactionRow,
    ) -> Result<TransactionId, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions
            (security_id, account_id, trade_date, settlement_date, created_at_ms, tx_type,
             quantity, price, fees, fx_rate, ratio, roc_per_share, cash_per_share,
             new_security_acb_percent, new_security_id, broker, external_id, notes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.security_id.as_i64())
        .bind(row.account_id.as_i64())
        .bind(row.trade_date.to_string())
        .bind(row.settlement_date.to_string())
        .bind(row.created_at_ms.as_i64())
        .bind(row.tx_type.as_str())
        .bind(row.quantity.to_canonical_string())
        .bind(row.price.to_canonical_string())
        .bind(row.fees.to_canonical_string())
        .bind(row.fx_rate.to_canonical_string())
        .bind(row.ratio.map(|d| d.to_canonical_string()))
        .bind(row.roc_per_share.map(|d| d.to_canonical_string()))
        .bind(row.cash_per_share.map(|d| d.to_canonical_string()))
        .bind(row.new_security_acb_percent.map(|d| d.to_canonical_string()))
        .bind(row.new_security_id.map(|id| id.as_i64()))
        .bind(row.broker.as_deref())
        .bind(row.external_id.as_deref())
        .bind(row.notes.as_deref())
        .execute(&mut *conn)
        .await?;

        Ok(TransactionId::new(result.last_insert_rowid()))
    }

    /// Write the recalculated snapshot fields of one row.
    #[allow(clippy::too_many_arguments)]
    pub async fn write_recalculation(
        conn: &mut SqliteConnection,
        id: TransactionId,
        shares_before: Decimal,
        shares_after: Decimal,
        acb_before: Decimal,
        acb_after: Decimal,
        capital_gain: Option<Decimal>,
        flags: &[TransactionFlag],
        details: &AuditTrail,
    ) -> Result<(), sqlx::Error> {
        let details_json = serde_json::to_string(details)
            .map_err(|e| sqlx::Error::Protocol(format!("audit serialization failed: {}", e)))?;

        sqlx::query(
            r#"
            UPDATE transactions
            SET shares_before = ?, shares_after = ?, acb_before = ?, acb_after = ?,
                capital_gain = ?, flags = ?, calculation_details = ?
            WHERE id = ?
            "#,
        )
        .bind(shares_before.to_canonical_string())
        .bind(shares_after.to_canonical_string())
        .bind(acb_before.to_canonical_string())
        .bind(acb_after.to_canonical_string())
        .bind(capital_gain.map(|g| g.to_canonical_string()))
        .bind(encode_flags(flags))
        .bind(details_json)
        .bind(id.as_i64())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Remove a row, returning it when it existed.
    pub async fn delete_transaction(
        conn: &mut SqliteConnection,
        id: TransactionId,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        let sql = format!("SELECT {} FROM transactions WHERE id = ?", TRANSACTION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&mut *conn)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let transaction = row_to_transaction(&row);

        sqlx::query("DELETE FROM transactions WHERE id = ?")
            .bind(id.as_i64())
            .execute(&mut *conn)
            .await?;

        Ok(Some(transaction))
    }

    /// Latest transaction of the series strictly before `date`.
    pub async fn find_prev_before(
        conn: &mut SqliteConnection,
        security_id: SecurityId,
        account_id: AccountId,
        date: NaiveDate,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM transactions
            WHERE security_id = ? AND account_id = ? AND trade_date < ?
            ORDER BY trade_date DESC, created_at_ms DESC, id DESC
            LIMIT 1
            "#,
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(security_id.as_i64())
            .bind(account_id.as_i64())
            .bind(date.to_string())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(row_to_transaction))
    }

    /// All transactions of the series with `trade_date >= from`, replay order.
    pub async fn find_suffix(
        conn: &mut SqliteConnection,
        security_id: SecurityId,
        account_id: AccountId,
        from: NaiveDate,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM transactions
            WHERE security_id = ? AND account_id = ? AND trade_date >= ?
            ORDER BY trade_date ASC, created_at_ms ASC, id ASC
            "#,
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(security_id.as_i64())
            .bind(account_id.as_i64())
            .bind(from.to_string())
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(row_to_transaction).collect())
    }

    /// Acquiring events (`buy`, `drip`) of a security in any account with a
    /// trade date inside `[start, end]`.
    pub async fn find_window_acquisitions(
        conn: &mut SqliteConnection,
        security_id: SecurityId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM transactions
            WHERE security_id = ? AND trade_date >= ? AND trade_date <= ?
              AND tx_type IN ('buy', 'drip')
            ORDER BY trade_date ASC, created_at_ms ASC, id ASC
            "#,
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(security_id.as_i64())
            .bind(start.to_string())
            .bind(end.to_string())
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(row_to_transaction).collect())
    }

    /// Terminal `shares_after` of every series of `security_id` other than
    /// the given account, as of `date` (latest row with `trade_date <= date`).
    pub async fn other_series_shares_at(
        conn: &mut SqliteConnection,
        security_id: SecurityId,
        exclude_account: AccountId,
        date: NaiveDate,
    ) -> Result<Decimal, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, shares_after
            FROM transactions
            WHERE security_id = ? AND account_id != ? AND trade_date <= ?
            ORDER BY account_id ASC, trade_date ASC, created_at_ms ASC, id ASC
            "#,
        )
        .bind(security_id.as_i64())
        .bind(exclude_account.as_i64())
        .bind(date.to_string())
        .fetch_all(&mut *conn)
        .await?;

        // The last row per account is the terminal snapshot at `date`.
        let mut total = Decimal::zero();
        let mut current: Option<(i64, Decimal)> = None;
        for row in rows {
            let account: i64 = row.get("account_id");
            let shares = super::parse_decimal("shares_after", &row.get::<String, _>("shares_after"));
            match current {
                Some((prev, prev_shares)) if prev != account => {
                    total = total + prev_shares;
                    current = Some((account, shares));
                }
                _ => current = Some((account, shares)),
            }
        }
        if let Some((_, shares)) = current {
            total = total + shares;
        }
        Ok(total)
    }

    /// Read one row through the surrounding store transaction.
    pub async fn fetch_transaction(
        conn: &mut SqliteConnection,
        id: TransactionId,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        let sql = format!("SELECT {} FROM transactions WHERE id = ?", TRANSACTION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(row_to_transaction))
    }

    pub async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        let sql = format!("SELECT {} FROM transactions WHERE id = ?", TRANSACTION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_transaction))
    }

    /// Presentation listing: newest first, optional series filters.
    pub async fn list_transactions(
        &self,
        security_id: Option<SecurityId>,
        account_id: Option<AccountId>,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let mut sql = format!("SELECT {} FROM transactions WHERE 1 = 1", TRANSACTION_COLUMNS);
        if security_id.is_some() {
            sql.push_str(" AND security_id = ?");
        }
        if account_id.is_some() {
            sql.push_str(" AND account_id = ?");
        }
        sql.push_str(" ORDER BY trade_date DESC, created_at_ms DESC, id DESC");

        let mut query = sqlx::query(&sql);
        if let Some(security_id) = security_id {
            query = query.bind(security_id.as_i64());
        }
        if let Some(account_id) = account_id {
            query = query.bind(account_id.as_i64());
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_transaction).collect())
    }

    /// Export listing: chronological replay order across all series.
    pub async fn list_transactions_chronological(&self) -> Result<Vec<Transaction>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM transactions ORDER BY trade_date ASC, created_at_ms ASC, id ASC",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_transaction).collect())
    }

    pub async fn external_id_exists(&self, external_id: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM transactions WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
