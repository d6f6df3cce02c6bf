use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_pair, AppState};
use crate::domain::Holding;
use crate::error::AppError;
use crate::store::HoldingsStore;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingsQuery {
    pub user_id: String,
    pub exchange_code: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingsResponse {
    pub holdings: Vec<HoldingDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingDto {
    pub instrument_id: i64,
    pub symbol: String,
    pub avg_buy_price: String,
    pub remaining_quantity: String,
}

impl From<Holding> for HoldingDto {
    fn from(h: Holding) -> Self {
        HoldingDto {
            instrument_id: h.instrument_id.as_i64(),
            symbol: h.symbol,
            avg_buy_price: h.state.avg_cost.to_canonical_string(),
            remaining_quantity: h.state.remaining_quantity.to_canonical_string(),
        }
    }
}

pub async fn get_holdings(
    State(state): State<AppState>,
    params: Result<Query<HoldingsQuery>, QueryRejection>,
) -> Result<Json<HoldingsResponse>, AppError> {
    let Query(params) = params?;
    let (user, exchange) = parse_pair(&params.user_id, params.exchange_code)?;

    let holdings = state
        .repo
        .list_holdings(&user, exchange)
        .await?
        .into_iter()
        .map(HoldingDto::from)
        .collect();

    Ok(Json(HoldingsResponse { holdings }))
}
