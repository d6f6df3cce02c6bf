pub mod health;
pub mod holdings;
pub mod instruments;
pub mod profit;
pub mod trades;

use crate::db::Repository;
use crate::domain::{ExchangeCode, UserId};
use crate::error::AppError;
use crate::orchestration::ProfitRecomputer;
use axum::{
    http::Uri,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub recomputer: Arc<ProfitRecomputer>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, recomputer: Arc<ProfitRecomputer>) -> Self {
        Self { repo, recomputer }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route(
            "/v1/trades",
            get(trades::get_trades).post(trades::ingest_trades),
        )
        .route(
            "/v1/trading-profit/calculate",
            post(profit::calculate_profit),
        )
        .route("/v1/holdings", get(holdings::get_holdings))
        .route("/v1/instruments", post(instruments::register_instrument))
        .fallback(route_not_found)
        .layer(cors)
        .with_state(state)
}

async fn route_not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}

/// Validate the (user, exchange) pair addressed by a request.
///
/// Runs before any store access so malformed pairs never reach the database.
pub(crate) fn parse_pair(
    user_id: &str,
    exchange_code: i64,
) -> Result<(UserId, ExchangeCode), AppError> {
    let user = UserId::parse(user_id)
        .map_err(|_| AppError::BadRequest(format!("Invalid userId: {}", user_id)))?;
    let exchange = ExchangeCode::try_from(exchange_code)?;
    Ok((user, exchange))
}
