//! API error types with IntoResponse
//!
//! Errors are converted to JSON responses with appropriate status codes.
//! Pool readiness and checkout-timeout failures map to 503 so callers can
//! retry; statement failures are logged and returned as a generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ledgerd_core::{DbError, PoolError};
use serde_json::json;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found (404)
    NotFound { resource: &'static str, id: String },

    /// Pool not ready or exhausted (503, retryable)
    Unavailable(DbError),

    /// Database error (500, logged)
    Database(DbError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": format!("{} '{}' not found", resource, id)
                }),
            ),
            Self::Unavailable(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "unavailable",
                    "message": e.to_string()
                }),
            ),
            Self::Database(e) => {
                // Log the actual error, return a generic message
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "internal_error",
                        "message": "an internal error occurred"
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match &e {
            DbError::Pool(
                PoolError::NotInitialized | PoolError::AcquireTimeout(_) | PoolError::Closed,
            ) => Self::Unavailable(e),
            _ => Self::Database(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn not_found_is_404() {
        let err = ApiError::NotFound {
            resource: "transaction",
            id: "42".into(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pool_not_ready_is_503() {
        let err = ApiError::from(DbError::Pool(PoolError::NotInitialized));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn acquire_timeout_is_503() {
        let err = ApiError::from(DbError::Pool(PoolError::AcquireTimeout(
            Duration::from_secs(30),
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn query_error_is_500() {
        let err = ApiError::from(DbError::Query(sqlx::Error::RowNotFound));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
