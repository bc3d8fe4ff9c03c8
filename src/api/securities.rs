use crate::api::AppState;
use crate::db::NewSecurity;
use crate::domain::{Currency, Security, SecurityId, SecurityKind};
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSecurityRequest {
    pub symbol: String,
    pub name: String,
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub exchange: Option<String>,
}

pub async fn create_security(
    State(state): State<AppState>,
    Json(request): Json<CreateSecurityRequest>,
) -> Result<(StatusCode, Json<Security>), AppError> {
    let symbol = request.symbol.trim().to_string();
    if symbol.is_empty() {
        return Err(AppError::BadRequest("symbol is required".into()));
    }
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    let currency = Currency::from_str(&request.currency)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let kind = SecurityKind::from_str(&request.kind).map_err(AppError::BadRequest)?;

    if state.repo.symbol_exists(&symbol).await? {
        return Err(AppError::BadRequest(format!(
            "a security with symbol {} already exists",
            symbol
        )));
    }

    let security = state
        .repo
        .insert_security(&NewSecurity {
            symbol,
            name: request.name.trim().to_string(),
            currency,
            kind,
            exchange: request.exchange,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(security)))
}

pub async fn list_securities(
    State(state): State<AppState>,
) -> Result<Json<Vec<Security>>, AppError> {
    Ok(Json(state.repo.list_securities().await?))
}

pub async fn get_security(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Security>, AppError> {
    state
        .repo
        .get_security(SecurityId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("security {}", id)))
}

pub async fn delete_security(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = SecurityId::new(id);
    state
        .repo
        .get_security(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("security {}", id)))?;

    let references = state.repo.count_transactions_for_security(id).await?;
    if references > 0 {
        return Err(AppError::BadRequest(format!(
            "security {} is referenced by {} transaction(s)",
            id, references
        )));
    }

    state.repo.delete_security(id).await?;
    Ok(Json(serde_json::json!({"deleted": true})))
}
