use crate::api::AppState;
use crate::db::NewAccount;
use crate::domain::{Account, AccountId, AccountKind};
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

pub async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    let kind = AccountKind::from_str(&request.kind).map_err(AppError::BadRequest)?;

    let account = state
        .repo
        .insert_account(&NewAccount {
            name: request.name.trim().to_string(),
            kind,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn list_accounts(State(state): State<AppState>) -> Result<Json<Vec<Account>>, AppError> {
    Ok(Json(state.repo.list_accounts().await?))
}

pub async fn get_account(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Account>, AppError> {
    state
        .repo
        .get_account(AccountId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("account {}", id)))
}

pub async fn delete_account(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = AccountId::new(id);
    state
        .repo
        .get_account(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("account {}", id)))?;

    let references = state.repo.count_transactions_for_account(id).await?;
    if references > 0 {
        return Err(AppError::BadRequest(format!(
            "account {} is referenced by {} transaction(s)",
            id, references
        )));
    }

    state.repo.delete_account(id).await?;
    Ok(Json(serde_json::json!({"deleted": true})))
}
