//! API error type and response mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use codescribe_entitlements::EntitlementError;

/// Request-scoped API errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Not found")]
    NotFound,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Feature not available: {0}")]
    FeatureNotAvailable(String),
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Rate limited")]
    RateLimited { retry_after_seconds: i64 },
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            other => {
                tracing::error!(error = %other, "Database query failed");
                ApiError::Database(other.to_string())
            }
        }
    }
}

impl From<EntitlementError> for ApiError {
    fn from(e: EntitlementError) -> Self {
        match e {
            EntitlementError::Validation(msg) => ApiError::Validation(msg),
            EntitlementError::TrialNotActive => ApiError::NotFound,
            EntitlementError::Database(db) => {
                tracing::error!(error = %db, "Entitlement query failed");
                ApiError::Database(db.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message): (StatusCode, String) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Authentication required".into()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Insufficient permissions".into()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Resource not found".into()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::FeatureNotAvailable(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::QuotaExceeded(msg) => (StatusCode::PAYMENT_REQUIRED, msg.clone()),
            ApiError::RateLimited {
                retry_after_seconds,
            } => {
                let body = Json(json!({
                    "error": "Too many requests. Please try again later.",
                    "code": StatusCode::TOO_MANY_REQUESTS.as_u16(),
                    "retry_after_seconds": retry_after_seconds,
                }));
                return (StatusCode::TOO_MANY_REQUESTS, body).into_response();
            }
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            // Never leak query details to clients
            ApiError::Database(_) | ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".into(),
            ),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
