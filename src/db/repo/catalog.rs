//! Security and account master-data operations.

use super::Repository;
use crate::domain::{Account, AccountId, AccountKind, Currency, Security, SecurityId, SecurityKind};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

/// Input for creating a security.
#[derive(Debug, Clone)]
pub struct NewSecurity {
    pub symbol: String,
    pub name: String,
    pub currency: Currency,
    pub kind: SecurityKind,
    pub exchange: Option<String>,
}

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub kind: AccountKind,
}

fn row_to_security(row: &SqliteRow) -> Security {
    let currency_str: String = row.get("currency");
    let kind_str: String = row.get("kind");
    Security {
        id: SecurityId::new(row.get("id")),
        symbol: row.get("symbol"),
        name: row.get("name"),
        currency: Currency::from_str(&currency_str).unwrap_or_else(|e| {
            warn!(value = %currency_str, error = e, "Invalid stored currency, defaulting to CAD");
            Currency::cad()
        }),
        kind: SecurityKind::from_str(&kind_str).unwrap_or_else(|e| {
            warn!(value = %kind_str, error = %e, "Invalid stored security kind, defaulting to stock");
            SecurityKind::Stock
        }),
        exchange: row.get("exchange"),
    }
}

fn row_to_account(row: &SqliteRow) -> Account {
    let kind_str: String = row.get("kind");
    Account {
        id: AccountId::new(row.get("id")),
        name: row.get("name"),
        kind: AccountKind::from_str(&kind_str).unwrap_or_else(|e| {
            warn!(value = %kind_str, error = %e, "Invalid stored account kind, defaulting to non-registered");
            AccountKind::NonRegistered
        }),
    }
}

impl Repository {
    pub async fn insert_security(&self, input: &NewSecurity) -> Result<Security, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO securities (symbol, name, currency, kind, exchange)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&input.symbol)
        .bind(&input.name)
        .bind(input.currency.as_str())
        .bind(input.kind.as_str())
        .bind(input.exchange.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(Security {
            id: SecurityId::new(result.last_insert_rowid()),
            symbol: input.symbol.clone(),
            name: input.name.clone(),
            currency: input.currency.clone(),
            kind: input.kind,
            exchange: input.exchange.clone(),
        })
    }

    pub async fn get_security(&self, id: SecurityId) -> Result<Option<Security>, sqlx::Error> {
        let row = sqlx::query("SELECT id, symbol, name, currency, kind, exchange FROM securities WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_security))
    }

    pub async fn list_securities(&self) -> Result<Vec<Security>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, symbol, name, currency, kind, exchange FROM securities ORDER BY symbol ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_security).collect())
    }

    pub async fn symbol_exists(&self, symbol: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM securities WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Delete a security; returns false when the row does not exist.
    pub async fn delete_security(&self, id: SecurityId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM securities WHERE id = ?")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_transactions_for_security(
        &self,
        id: SecurityId,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM transactions WHERE security_id = ? OR new_security_id = ?",
        )
        .bind(id.as_i64())
        .bind(id.as_i64())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn insert_account(&self, input: &NewAccount) -> Result<Account, sqlx::Error> {
        let result = sqlx::query("INSERT INTO accounts (name, kind) VALUES (?, ?)")
            .bind(&input.name)
            .bind(input.kind.as_str())
            .execute(&self.pool)
            .await?;

        Ok(Account {
            id: AccountId::new(result.last_insert_rowid()),
            name: input.name.clone(),
            kind: input.kind,
        })
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>, sqlx::Error> {
        let row = sqlx::query("SELECT id, name, kind FROM accounts WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_account))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, sqlx::Error> {
        let rows = sqlx::query("SELECT id, name, kind FROM accounts ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_account).collect())
    }

    pub async fn delete_account(&self, id: AccountId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_transactions_for_account(&self, id: AccountId) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE account_id = ?")
            .bind(id.as_i64())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
