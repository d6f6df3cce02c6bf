use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_pair, AppState};
use crate::domain::{Decimal, ExchangeCode, InstrumentId, NewTrade, Side, TimeMs, Trade, UserId};
use crate::engine::RATE_DECIMAL_PLACES;
use crate::error::AppError;
use crate::store::{InstrumentResolver, TradeStore};
use std::collections::BTreeSet;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesQuery {
    pub user_id: String,
    pub exchange_code: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesResponse {
    pub trades: Vec<TradeDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeDto {
    pub id: i64,
    pub external_trade_id: String,
    pub instrument_id: i64,
    pub side: String,
    pub price: String,
    pub quantity: String,
    pub fee: String,
    pub time_ms: i64,
    pub profit_loss_rate: Option<String>,
    pub avg_buy_price: Option<String>,
}

impl From<Trade> for TradeDto {
    fn from(t: Trade) -> Self {
        TradeDto {
            id: t.id.as_i64(),
            external_trade_id: t.external_trade_id,
            instrument_id: t.instrument_id.as_i64(),
            side: t.side.as_str().to_string(),
            price: t.price.to_canonical_string(),
            quantity: t.quantity.to_canonical_string(),
            fee: t.fee.to_canonical_string(),
            time_ms: t.time_ms.as_ms(),
            profit_loss_rate: t
                .profit_loss_rate
                .map(|r| r.to_fixed_string(RATE_DECIMAL_PLACES)),
            avg_buy_price: t.avg_buy_price.map(|p| p.to_canonical_string()),
        }
    }
}

pub async fn get_trades(
    State(state): State<AppState>,
    params: Result<Query<TradesQuery>, QueryRejection>,
) -> Result<Json<TradesResponse>, AppError> {
    let Query(params) = params?;
    let (user, exchange) = parse_pair(&params.user_id, params.exchange_code)?;

    let trades = state
        .repo
        .list_trades(&user, exchange)
        .await?
        .into_iter()
        .map(TradeDto::from)
        .collect();

    Ok(Json(TradesResponse { trades }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub user_id: String,
    pub exchange_code: i64,
    pub trades: Vec<TradeInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeInput {
    pub external_trade_id: String,
    pub instrument_id: i64,
    pub side: String,
    pub price: String,
    pub quantity: String,
    pub fee: Option<String>,
    /// RFC 3339, any offset.
    pub trade_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub received: usize,
    pub inserted: usize,
}

/// Ingest a batch of executions. Duplicate external ids are skipped.
///
/// The whole batch is rejected if any entry is malformed.
pub async fn ingest_trades(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let Json(req) = payload?;
    let (user, exchange) = parse_pair(&req.user_id, req.exchange_code)?;

    let trades = req
        .trades
        .iter()
        .enumerate()
        .map(|(idx, input)| parse_trade_input(user, exchange, input, idx))
        .collect::<Result<Vec<_>, _>>()?;

    let referenced: BTreeSet<InstrumentId> = trades.iter().map(|t| t.instrument_id).collect();
    for instrument in referenced {
        if state.repo.symbol_for(instrument).await?.is_none() {
            return Err(AppError::BadRequest(format!(
                "Unknown instrument reference: {}",
                instrument
            )));
        }
    }

    let inserted = state.repo.insert_trades_batch(&trades).await?;
    tracing::info!(
        user = %user,
        exchange = %exchange,
        received = trades.len(),
        inserted,
        "Ingested trades"
    );

    Ok(Json(IngestResponse {
        received: trades.len(),
        inserted,
    }))
}

fn parse_trade_input(
    user: UserId,
    exchange: ExchangeCode,
    input: &TradeInput,
    idx: usize,
) -> Result<NewTrade, AppError> {
    let invalid = |field: &str, detail: &str| {
        AppError::BadRequest(format!("trades[{}].{}: {}", idx, field, detail))
    };

    if input.external_trade_id.trim().is_empty() {
        return Err(invalid("externalTradeId", "must not be empty"));
    }
    if input.instrument_id <= 0 {
        return Err(invalid("instrumentId", "must be positive"));
    }
    let side = Side::parse(&input.side).ok_or_else(|| invalid("side", "must be buy or sell"))?;
    let price =
        parse_decimal_field(&input.price).ok_or_else(|| invalid("price", "not a decimal"))?;
    if !price.is_positive() {
        return Err(invalid("price", "must be positive"));
    }
    let quantity =
        parse_decimal_field(&input.quantity).ok_or_else(|| invalid("quantity", "not a decimal"))?;
    if !quantity.is_positive() {
        return Err(invalid("quantity", "must be positive"));
    }
    if price.checked_mul(quantity).is_none() {
        return Err(invalid("quantity", "price times quantity is out of range"));
    }
    let fee = match input.fee.as_deref() {
        None => Decimal::zero(),
        Some(raw) => parse_decimal_field(raw).ok_or_else(|| invalid("fee", "not a decimal"))?,
    };
    if fee.is_negative() {
        return Err(invalid("fee", "must not be negative"));
    }
    let time_ms = TimeMs::parse_rfc3339(&input.trade_time)
        .map_err(|_| invalid("tradeTime", "must be an RFC 3339 timestamp"))?;

    Ok(NewTrade {
        user_id: user,
        exchange,
        external_trade_id: input.external_trade_id.trim().to_string(),
        instrument_id: InstrumentId::new(input.instrument_id),
        side,
        price,
        quantity,
        fee,
        time_ms,
    })
}

fn parse_decimal_field(raw: &str) -> Option<Decimal> {
    Decimal::from_str_canonical(raw).ok()
}
