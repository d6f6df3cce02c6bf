use axum::body::Body;
use axum::http::{Request, StatusCode};
use profitledger::api;
use profitledger::db::init_db;
use profitledger::store::LedgerStore;
use profitledger::{ProfitRecomputer, Repository};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

const USER: &str = "0b7e6f7a-3c44-4d6f-8a1e-5d2b9c0f1a23";

struct TestApp {
    app: axum::Router,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let store: Arc<dyn LedgerStore> = repo.clone();
    let recomputer = Arc::new(ProfitRecomputer::new(store, Duration::from_secs(5)));

    TestApp {
        app: api::create_router(api::AppState::new(repo, recomputer)),
        _temp: temp_dir,
    }
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn post(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, req).await
}

async fn register_btc(app: &axum::Router) -> i64 {
    let (status, body) = post(
        app,
        "/v1/instruments",
        json!({"symbol": "btc", "quoteCurrency": "krw", "marketCode": "KRW-BTC"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_i64().unwrap()
}

fn trade(ext: &str, instrument: i64, side: &str, qty: &str, price: &str, time: &str) -> Value {
    json!({
        "externalTradeId": ext,
        "instrumentId": instrument,
        "side": side,
        "price": price,
        "quantity": qty,
        "tradeTime": time,
    })
}

#[tokio::test]
async fn test_health_and_ready() {
    let test_app = setup_test_app().await;
    let (status, body) = get(&test_app.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get(&test_app.app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_ingest_calculate_and_read_back() {
    let test_app = setup_test_app().await;
    let app = &test_app.app;
    let btc = register_btc(app).await;

    let (status, body) = post(
        app,
        "/v1/trades",
        json!({
            "userId": USER,
            "exchangeCode": 1,
            "trades": [
                trade("t1", btc, "buy", "2", "10", "2024-03-01T09:00:00+09:00"),
                trade("t2", btc, "buy", "3", "20", "2024-03-01T01:00:00Z"),
                trade("t3", btc, "sell", "4", "30", "2024-03-01T02:00:00Z"),
            ],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], 3);
    assert_eq!(body["inserted"], 3);

    let (status, body) = post(
        app,
        "/v1/trading-profit/calculate",
        json!({"userId": USER, "exchangeCode": 1, "isInitial": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updatedCount"], 1);
    assert_eq!(body["holdingsCount"], 1);
    assert_eq!(body["deletedHoldingsCount"], 0);
    assert_eq!(body["mode"], "full");

    let (status, body) = get(app, &format!("/v1/trades?userId={}&exchangeCode=1", USER)).await;
    assert_eq!(status, StatusCode::OK);
    let trades = body["trades"].as_array().unwrap();
    assert_eq!(trades.len(), 3);
    assert_eq!(trades[0]["externalTradeId"], "t1");
    assert_eq!(trades[2]["profitLossRate"], "87.50");
    assert_eq!(trades[2]["avgBuyPrice"], "16");
    assert!(trades[0]["profitLossRate"].is_null());

    let (status, body) = get(app, &format!("/v1/holdings?userId={}&exchangeCode=1", USER)).await;
    assert_eq!(status, StatusCode::OK);
    let holdings = body["holdings"].as_array().unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0]["symbol"], "BTC");
    assert_eq!(holdings[0]["avgBuyPrice"], "16");
    assert_eq!(holdings[0]["remainingQuantity"], "1");
}

#[tokio::test]
async fn test_reingesting_same_trades_is_idempotent() {
    let test_app = setup_test_app().await;
    let app = &test_app.app;
    let btc = register_btc(app).await;
    let payload = json!({
        "userId": USER,
        "exchangeCode": 2,
        "trades": [trade("dup", btc, "BUY", "1", "5", "2024-01-01T00:00:00Z")],
    });

    let (_, first) = post(app, "/v1/trades", payload.clone()).await;
    let (_, second) = post(app, "/v1/trades", payload).await;
    assert_eq!(first["inserted"], 1);
    assert_eq!(second["received"], 1);
    assert_eq!(second["inserted"], 0);
}

#[tokio::test]
async fn test_invalid_exchange_code_is_rejected() {
    let test_app = setup_test_app().await;
    let (status, body) = post(
        &test_app.app,
        "/v1/trading-profit/calculate",
        json!({"userId": USER, "exchangeCode": 9}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_EXCHANGE_CODE");

    let (status, body) = get(
        &test_app.app,
        &format!("/v1/holdings?userId={}&exchangeCode=0", USER),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_EXCHANGE_CODE");
}

#[tokio::test]
async fn test_validation_errors() {
    let test_app = setup_test_app().await;
    let app = &test_app.app;

    let (status, body) = post(
        app,
        "/v1/trading-profit/calculate",
        json!({"userId": "nobody", "exchangeCode": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = post(app, "/v1/trading-profit/calculate", json!({"userId": USER})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = post(
        app,
        "/v1/trades",
        json!({
            "userId": USER,
            "exchangeCode": 1,
            "trades": [trade("x", 1, "buy", "-1", "5", "2024-01-01T00:00:00Z")],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = get(app, "/v1/trades?exchangeCode=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_calculate_with_no_trades_returns_zero_counts() {
    let test_app = setup_test_app().await;
    let (status, body) = post(
        &test_app.app,
        "/v1/trading-profit/calculate",
        json!({"userId": USER, "exchangeCode": 4}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updatedCount"], 0);
    assert_eq!(body["holdingsCount"], 0);
    assert_eq!(body["deletedHoldingsCount"], 0);
}

#[tokio::test]
async fn test_unknown_instrument_reference_is_rejected() {
    let test_app = setup_test_app().await;
    let app = &test_app.app;
    let btc = register_btc(app).await;

    let (status, body) = post(
        app,
        "/v1/trades",
        json!({
            "userId": USER,
            "exchangeCode": 1,
            "trades": [
                trade("known", btc, "buy", "1", "5", "2024-01-01T00:00:00Z"),
                trade("orphan", 999, "buy", "1", "5", "2024-01-01T00:00:01Z"),
            ],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["error"].as_str().unwrap().contains("999"));

    // The batch is rejected as a whole.
    let (_, body) = get(app, &format!("/v1/trades?userId={}&exchangeCode=1", USER)).await;
    assert!(body["trades"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_trade_is_rejected_at_ingestion() {
    let test_app = setup_test_app().await;
    let app = &test_app.app;
    let btc = register_btc(app).await;

    let (status, body) = post(
        app,
        "/v1/trades",
        json!({
            "userId": USER,
            "exchangeCode": 1,
            "trades": [trade(
                "huge",
                btc,
                "buy",
                "100000000000000000000",
                "10000000000",
                "2024-01-01T00:00:00Z",
            )],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let test_app = setup_test_app().await;
    let (status, body) = get(&test_app.app, "/v1/nothing-here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}
