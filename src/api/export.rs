//! Ledger export: CSV with a fixed column order, and full JSON.

use crate::api::transactions::TransactionDto;
use crate::api::AppState;
use crate::domain::{Account, Decimal, Security, Transaction};
use crate::error::AppError;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use std::collections::HashMap;

const CSV_HEADER: [&str; 16] = [
    "Date",
    "Settlement Date",
    "Type",
    "Security",
    "Account",
    "Quantity",
    "Price",
    "Currency",
    "FX Rate",
    "ACB Before",
    "ACB After",
    "Shares Before",
    "Shares After",
    "Capital Gain/Loss",
    "Flags",
    "Notes",
];

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn csv_row(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| csv_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

fn csv_decimal(value: Decimal) -> String {
    value.to_canonical_string()
}

/// Render the full ledger; every field quoted, rows `\n`-separated.
pub fn render_csv(
    transactions: &[Transaction],
    securities: &HashMap<i64, Security>,
    accounts: &HashMap<i64, Account>,
) -> String {
    let mut out = String::new();
    out.push_str(&csv_row(
        &CSV_HEADER.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
    ));
    out.push('\n');

    for tx in transactions {
        let security = securities.get(&tx.security_id.as_i64());
        let account = accounts.get(&tx.account_id.as_i64());
        let fields = vec![
            tx.trade_date.to_string(),
            tx.settlement_date.to_string(),
            tx.tx_type.as_str().to_string(),
            security.map(|s| s.symbol.clone()).unwrap_or_default(),
            account.map(|a| a.name.clone()).unwrap_or_default(),
            csv_decimal(tx.quantity),
            csv_decimal(tx.price),
            security
                .map(|s| s.currency.as_str().to_string())
                .unwrap_or_default(),
            csv_decimal(tx.fx_rate),
            csv_decimal(tx.acb_before),
            csv_decimal(tx.acb_after),
            csv_decimal(tx.shares_before),
            csv_decimal(tx.shares_after),
            tx.capital_gain.map(csv_decimal).unwrap_or_default(),
            tx.flags
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(";"),
            tx.notes.clone().unwrap_or_default(),
        ];
        out.push_str(&csv_row(&fields));
        out.push('\n');
    }

    out
}

pub async fn export_csv(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let transactions = state.repo.list_transactions_chronological().await?;
    let securities: HashMap<i64, Security> = state
        .repo
        .list_securities()
        .await?
        .into_iter()
        .map(|s| (s.id.as_i64(), s))
        .collect();
    let accounts: HashMap<i64, Account> = state
        .repo
        .list_accounts()
        .await?
        .into_iter()
        .map(|a| (a.id.as_i64(), a))
        .collect();

    let body = render_csv(&transactions, &securities, &accounts);
    Ok((
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        body,
    ))
}

pub async fn export_json(
    State(state): State<AppState>,
) -> Result<Json<Vec<TransactionDto>>, AppError> {
    let transactions = state.repo.list_transactions_chronological().await?;
    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}
