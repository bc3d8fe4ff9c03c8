use crate::api::AppState;
use crate::domain::{Currency, Decimal};
use crate::error::AppError;
use crate::fx::FxError;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFxRateRequest {
    pub date: String,
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateQuery {
    pub date: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateResponse {
    pub date: NaiveDate,
    pub from: String,
    pub to: String,
    pub rate: Decimal,
}

fn parse_date(value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::from_str(value)
        .map_err(|_| AppError::BadRequest("date must be a YYYY-MM-DD date".into()))
}

fn parse_currency(field: &str, value: &str) -> Result<Currency, AppError> {
    Currency::from_str(value).map_err(|e| AppError::BadRequest(format!("{}: {}", field, e)))
}

pub async fn create_fx_rate(
    State(state): State<AppState>,
    Json(request): Json<CreateFxRateRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let date = parse_date(&request.date)?;
    let from = parse_currency("from", &request.from)?;
    let to = parse_currency("to", &request.to)?;
    let rate = Decimal::try_from_f64(request.rate)
        .map_err(|_| AppError::BadRequest("rate is not an exact decimal value".into()))?;
    if !rate.is_positive() {
        return Err(AppError::BadRequest("rate must be positive".into()));
    }

    let inserted = state
        .repo
        .insert_fx_rate(
            date,
            &from,
            &to,
            rate.round_rate(),
            request.source.as_deref().unwrap_or("manual"),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"inserted": inserted})),
    ))
}

pub async fn get_rate(
    Query(params): Query<RateQuery>,
    State(state): State<AppState>,
) -> Result<Json<RateResponse>, AppError> {
    let date = parse_date(&params.date)?;
    let from = parse_currency("from", &params.from)?;
    let to = parse_currency("to", &params.to)?;

    let rate = state
        .oracle
        .rate(date, &from, &to)
        .await
        .map_err(|e| match e {
            FxError::RateNotAvailable { .. } => AppError::NotFound(e.to_string()),
            FxError::Store(msg) => AppError::Internal(msg),
        })?;

    Ok(Json(RateResponse {
        date,
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
        rate: rate.round_rate(),
    }))
}
