//! FX observation storage: write-through cache with insert-or-ignore.

use super::{parse_date, parse_decimal, Repository};
use crate::domain::{Currency, Decimal};
use chrono::{Days, NaiveDate};
use sqlx::Row;

impl Repository {
    /// Record an observation; duplicates on (date, from, to) are ignored.
    /// Returns whether a new row was written.
    pub async fn insert_fx_rate(
        &self,
        date: NaiveDate,
        from: &Currency,
        to: &Currency,
        rate: Decimal,
        source: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO fx_rates (rate_date, from_currency, to_currency, rate, source)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(rate_date, from_currency, to_currency) DO NOTHING
            "#,
        )
        .bind(date.to_string())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(rate.to_canonical_string())
        .bind(source)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Latest observation on `date` or within `lookback_days` before it.
    pub async fn find_fx_rate_on_or_before(
        &self,
        date: NaiveDate,
        from: &Currency,
        to: &Currency,
        lookback_days: u64,
    ) -> Result<Option<(NaiveDate, Decimal)>, sqlx::Error> {
        let earliest = date - Days::new(lookback_days);
        let row = sqlx::query(
            r#"
            SELECT rate_date, rate
            FROM fx_rates
            WHERE from_currency = ? AND to_currency = ? AND rate_date <= ? AND rate_date >= ?
            ORDER BY rate_date DESC
            LIMIT 1
            "#,
        )
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(date.to_string())
        .bind(earliest.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            (
                parse_date("rate_date", &row.get::<String, _>("rate_date")),
                parse_decimal("rate", &row.get::<String, _>("rate")),
            )
        }))
    }
}
