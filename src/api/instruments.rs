use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::db::repo::NewInstrument;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInstrumentRequest {
    pub symbol: String,
    pub quote_currency: String,
    pub market_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInstrumentResponse {
    pub id: i64,
}

pub async fn register_instrument(
    State(state): State<AppState>,
    payload: Result<Json<RegisterInstrumentRequest>, JsonRejection>,
) -> Result<Json<RegisterInstrumentResponse>, AppError> {
    let Json(req) = payload?;
    let symbol = req.symbol.trim();
    let quote_currency = req.quote_currency.trim();
    if symbol.is_empty() || quote_currency.is_empty() {
        return Err(AppError::BadRequest(
            "symbol and quoteCurrency must not be empty".into(),
        ));
    }

    let id = state
        .repo
        .insert_instrument(&NewInstrument {
            symbol: symbol.to_uppercase(),
            quote_currency: quote_currency.to_uppercase(),
            market_code: req
                .market_code
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
        })
        .await?;

    Ok(Json(RegisterInstrumentResponse { id: id.as_i64() }))
}
