//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Server-side failures are
//! captured to Sentry before the response is built; a missing order is an
//! ordinary 404 and is never reported.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application-level error type for the read API.
#[derive(Debug, Error)]
pub enum AppError {
    /// No order is cached under the requested identifier.
    #[error("Order not found: {0}")]
    NotFound(String),

    /// The database did not answer.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Database(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let (status, message) = match &self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "order not found"),
            // Don't expose connection details to clients
            Self::Database(_) => (StatusCode::SERVICE_UNAVAILABLE, "database unavailable"),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("abc123".to_string());
        assert_eq!(err.to_string(), "Order not found: abc123");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::NotFound("abc123".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Database(sqlx::Error::PoolTimedOut)),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_database_error_hides_details() {
        let response = AppError::Database(sqlx::Error::PoolTimedOut).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"database unavailable");
    }
}
