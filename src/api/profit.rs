use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_pair, AppState};
use crate::error::AppError;
use crate::orchestration::RecomputeMode;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateRequest {
    pub user_id: String,
    pub exchange_code: i64,
    /// Caller's guess at whether this is the first run. Informational only.
    pub is_initial: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateResponse {
    pub message: String,
    pub updated_count: usize,
    pub holdings_count: usize,
    pub deleted_holdings_count: usize,
    pub mode: RecomputeMode,
}

pub async fn calculate_profit(
    State(state): State<AppState>,
    payload: Result<Json<CalculateRequest>, JsonRejection>,
) -> Result<Json<CalculateResponse>, AppError> {
    let Json(req) = payload?;
    let (user, exchange) = parse_pair(&req.user_id, req.exchange_code)?;

    let summary = state
        .recomputer
        .recompute(user, exchange, req.is_initial)
        .await?;

    Ok(Json(CalculateResponse {
        message: "Trading profit calculated".to_string(),
        updated_count: summary.updated_count,
        holdings_count: summary.holdings_count,
        deleted_holdings_count: summary.deleted_holdings_count,
        mode: summary.mode,
    }))
}
