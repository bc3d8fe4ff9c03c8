use crate::api::AppState;
use crate::domain::Decimal;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDto {
    pub security_id: i64,
    pub account_id: i64,
    pub shares: Decimal,
    pub acb: Decimal,
    pub acb_per_share: Decimal,
}

pub async fn list_positions(
    State(state): State<AppState>,
) -> Result<Json<Vec<PositionDto>>, AppError> {
    let positions = state.repo.list_positions().await?;
    Ok(Json(
        positions
            .into_iter()
            .map(|p| PositionDto {
                security_id: p.security_id.as_i64(),
                account_id: p.account_id.as_i64(),
                shares: p.shares,
                acb: p.total_acb,
                acb_per_share: p.total_acb.safe_div(p.shares).round_per_share(),
            })
            .collect(),
    ))
}
