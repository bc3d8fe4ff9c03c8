use crate::api::AppState;
use crate::domain::{
    AccountId, AuditTrail, Decimal, SecurityId, Transaction, TransactionId, TransactionType,
};
use crate::error::AppError;
use crate::orchestration::{CreateTransactionInput, TransactionPatch};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    pub date: String,
    pub settlement_date: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub security_id: i64,
    pub account_id: i64,
    pub quantity: f64,
    pub price: f64,
    #[serde(default)]
    pub fees: f64,
    pub fx_rate: Option<f64>,
    pub ratio: Option<f64>,
    pub roc_per_share: Option<f64>,
    pub cash_per_share: Option<f64>,
    pub new_security_acb_percent: Option<f64>,
    pub new_security_id: Option<i64>,
    pub broker: Option<String>,
    pub external_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransactionRequest {
    pub date: Option<String>,
    pub settlement_date: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    pub security_id: Option<i64>,
    pub account_id: Option<i64>,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
    pub fees: Option<f64>,
    pub fx_rate: Option<f64>,
    pub ratio: Option<f64>,
    pub roc_per_share: Option<f64>,
    pub cash_per_share: Option<f64>,
    pub new_security_acb_percent: Option<f64>,
    pub new_security_id: Option<i64>,
    pub broker: Option<String>,
    pub external_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    pub security_id: Option<i64>,
    pub account_id: Option<i64>,
}

/// Persisted transaction plus the derived figures the UI shows.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: i64,
    pub security_id: i64,
    pub account_id: i64,
    pub date: NaiveDate,
    pub settlement_date: NaiveDate,
    pub created_at_ms: i64,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fees: Decimal,
    pub fx_rate: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roc_per_share: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_per_share: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_security_acb_percent: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_security_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub shares_before: Decimal,
    pub shares_after: Decimal,
    pub acb_before: Decimal,
    pub acb_after: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capital_gain: Option<Decimal>,
    pub acb_per_share: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proceeds: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acb_used: Option<Decimal>,
    pub flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation_details: Option<AuditTrail>,
}

impl From<Transaction> for TransactionDto {
    fn from(tx: Transaction) -> Self {
        let acb_per_share = tx.acb_per_share();
        let (proceeds, acb_used) = match tx.tx_type {
            TransactionType::Sell => (
                Some((tx.price * tx.quantity * tx.fx_rate - tx.fees).round_money()),
                Some((tx.acb_before - tx.acb_after).round_money()),
            ),
            TransactionType::TransferOut => {
                (None, Some((tx.acb_before - tx.acb_after).round_money()))
            }
            _ => (None, None),
        };

        TransactionDto {
            id: tx.id.as_i64(),
            security_id: tx.security_id.as_i64(),
            account_id: tx.account_id.as_i64(),
            date: tx.trade_date,
            settlement_date: tx.settlement_date,
            created_at_ms: tx.created_at_ms.as_i64(),
            tx_type: tx.tx_type.as_str().to_string(),
            quantity: tx.quantity,
            price: tx.price,
            fees: tx.fees,
            fx_rate: tx.fx_rate,
            ratio: tx.ratio,
            roc_per_share: tx.roc_per_share,
            cash_per_share: tx.cash_per_share,
            new_security_acb_percent: tx.new_security_acb_percent,
            new_security_id: tx.new_security_id.map(|id| id.as_i64()),
            broker: tx.broker,
            external_id: tx.external_id,
            notes: tx.notes,
            shares_before: tx.shares_before,
            shares_after: tx.shares_after,
            acb_before: tx.acb_before,
            acb_after: tx.acb_after,
            capital_gain: tx.capital_gain,
            acb_per_share,
            proceeds,
            acb_used,
            flags: tx.flags.iter().map(|f| f.as_str().to_string()).collect(),
            calculation_details: tx.calculation_details,
        }
    }
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::from_str(value)
        .map_err(|_| AppError::BadRequest(format!("{} must be a YYYY-MM-DD date", field)))
}

fn parse_type(value: &str) -> Result<TransactionType, AppError> {
    TransactionType::from_str(value).map_err(AppError::BadRequest)
}

fn parse_decimal(field: &str, value: f64) -> Result<Decimal, AppError> {
    Decimal::try_from_f64(value)
        .map_err(|_| AppError::BadRequest(format!("{} is not an exact decimal value", field)))
}

fn parse_opt_decimal(field: &str, value: Option<f64>) -> Result<Option<Decimal>, AppError> {
    value.map(|v| parse_decimal(field, v)).transpose()
}

impl CreateTransactionRequest {
    fn into_input(self) -> Result<CreateTransactionInput, AppError> {
        Ok(CreateTransactionInput {
            security_id: SecurityId::new(self.security_id),
            account_id: AccountId::new(self.account_id),
            trade_date: parse_date("date", &self.date)?,
            settlement_date: self
                .settlement_date
                .as_deref()
                .map(|d| parse_date("settlementDate", d))
                .transpose()?,
            tx_type: parse_type(&self.tx_type)?,
            quantity: parse_decimal("quantity", self.quantity)?,
            price: parse_decimal("price", self.price)?,
            fees: parse_decimal("fees", self.fees)?,
            fx_rate: parse_opt_decimal("fxRate", self.fx_rate)?,
            ratio: parse_opt_decimal("ratio", self.ratio)?,
            roc_per_share: parse_opt_decimal("rocPerShare", self.roc_per_share)?,
            cash_per_share: parse_opt_decimal("cashPerShare", self.cash_per_share)?,
            new_security_acb_percent: parse_opt_decimal(
                "newSecurityAcbPercent",
                self.new_security_acb_percent,
            )?,
            new_security_id: self.new_security_id.map(SecurityId::new),
            broker: self.broker,
            external_id: self.external_id,
            notes: self.notes,
        })
    }
}

impl UpdateTransactionRequest {
    fn into_patch(self) -> Result<TransactionPatch, AppError> {
        Ok(TransactionPatch {
            security_id: self.security_id.map(SecurityId::new),
            account_id: self.account_id.map(AccountId::new),
            trade_date: self
                .date
                .as_deref()
                .map(|d| parse_date("date", d))
                .transpose()?,
            settlement_date: self
                .settlement_date
                .as_deref()
                .map(|d| parse_date("settlementDate", d))
                .transpose()?,
            tx_type: self.tx_type.as_deref().map(parse_type).transpose()?,
            quantity: parse_opt_decimal("quantity", self.quantity)?,
            price: parse_opt_decimal("price", self.price)?,
            fees: parse_opt_decimal("fees", self.fees)?,
            fx_rate: parse_opt_decimal("fxRate", self.fx_rate)?,
            ratio: parse_opt_decimal("ratio", self.ratio)?,
            roc_per_share: parse_opt_decimal("rocPerShare", self.roc_per_share)?,
            cash_per_share: parse_opt_decimal("cashPerShare", self.cash_per_share)?,
            new_security_acb_percent: parse_opt_decimal(
                "newSecurityAcbPercent",
                self.new_security_acb_percent,
            )?,
            new_security_id: self.new_security_id.map(SecurityId::new),
            broker: self.broker,
            external_id: self.external_id,
            notes: self.notes,
        })
    }
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<TransactionDto>), AppError> {
    let input = request.into_input()?;
    let transaction = state.ledger.create(input).await?;
    Ok((StatusCode::CREATED, Json(transaction.into())))
}

pub async fn list_transactions(
    Query(params): Query<TransactionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<TransactionDto>>, AppError> {
    let transactions = state
        .repo
        .list_transactions(
            params.security_id.map(SecurityId::new),
            params.account_id.map(AccountId::new),
        )
        .await?;
    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}

pub async fn get_transaction(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<TransactionDto>, AppError> {
    state
        .repo
        .get_transaction(TransactionId::new(id))
        .await?
        .map(|tx| Json(tx.into()))
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", id)))
}

pub async fn update_transaction(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(request): Json<UpdateTransactionRequest>,
) -> Result<Json<TransactionDto>, AppError> {
    let patch = request.into_patch()?;
    let transaction = state.ledger.update(TransactionId::new(id), patch).await?;
    Ok(Json(transaction.into()))
}

pub async fn delete_transaction(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<TransactionDto>, AppError> {
    let deleted = state.ledger.delete(TransactionId::new(id)).await?;
    Ok(Json(deleted.into()))
}
