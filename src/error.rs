use crate::domain::UnknownExchangeCode;
use crate::orchestration::RecomputeError;
use crate::store::StoreError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Invalid exchange code: {0}")]
    InvalidExchangeCode(i64),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "INTERNAL_SERVER_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "VALIDATION_ERROR",
            AppError::InvalidExchangeCode(_) => "INVALID_EXCHANGE_CODE",
            AppError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            AppError::Timeout(_) => "TIMEOUT",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::InvalidExchangeCode(_) => StatusCode::BAD_REQUEST,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<UnknownExchangeCode> for AppError {
    fn from(err: UnknownExchangeCode) -> Self {
        AppError::InvalidExchangeCode(err.0)
    }
}

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(err: QueryRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::StorageUnavailable(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Corrupt(msg) => AppError::Internal(msg),
            other => AppError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<RecomputeError> for AppError {
    fn from(err: RecomputeError) -> Self {
        match err {
            RecomputeError::Validation(e) => AppError::BadRequest(e.to_string()),
            RecomputeError::Store(e) => e.into(),
            RecomputeError::Timeout(d) => {
                AppError::Timeout(format!("recompute exceeded {}ms", d.as_millis()))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
