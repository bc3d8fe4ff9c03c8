//! Derived position cache: terminal (shares, ACB) per series.

use super::{parse_decimal, Repository};
use crate::domain::{AccountId, Decimal, SecurityId};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

/// One (security, account) pair with its terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRow {
    pub security_id: SecurityId,
    pub account_id: AccountId,
    pub shares: Decimal,
    pub total_acb: Decimal,
}

impl Repository {
    /// Write the terminal state of a series; one row per pair, never deleted.
    pub async fn upsert_position(
        conn: &mut SqliteConnection,
        security_id: SecurityId,
        account_id: AccountId,
        shares: Decimal,
        total_acb: Decimal,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO positions (security_id, account_id, shares, total_acb)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(security_id, account_id) DO UPDATE SET
                shares = excluded.shares,
                total_acb = excluded.total_acb
            "#,
        )
        .bind(security_id.as_i64())
        .bind(account_id.as_i64())
        .bind(shares.to_canonical_string())
        .bind(total_acb.to_canonical_string())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn get_position(
        &self,
        security_id: SecurityId,
        account_id: AccountId,
    ) -> Result<Option<PositionRow>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT security_id, account_id, shares, total_acb FROM positions WHERE security_id = ? AND account_id = ?",
        )
        .bind(security_id.as_i64())
        .bind(account_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| PositionRow {
            security_id: SecurityId::new(row.get("security_id")),
            account_id: AccountId::new(row.get("account_id")),
            shares: parse_decimal("shares", &row.get::<String, _>("shares")),
            total_acb: parse_decimal("total_acb", &row.get::<String, _>("total_acb")),
        }))
    }

    pub async fn list_positions(&self) -> Result<Vec<PositionRow>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT security_id, account_id, shares, total_acb FROM positions ORDER BY security_id ASC, account_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PositionRow {
                security_id: SecurityId::new(row.get("security_id")),
                account_id: AccountId::new(row.get("account_id")),
                shares: parse_decimal("shares", &row.get::<String, _>("shares")),
                total_acb: parse_decimal("total_acb", &row.get::<String, _>("total_acb")),
            })
            .collect())
    }
}
