//! Error types for followbox
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// Federation failures keep their own variants so callers can tell an
/// unverifiable inbound request apart from an unreachable remote server.
#[derive(Debug, Error)]
pub enum AppError {
    /// Undecodable JSON or missing required fields (400)
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Signature, digest or key dereference failed (400)
    #[error("Signature verification failed: {0}")]
    VerificationFailed(String),

    /// Request parameters rejected (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Resource lives at a canonical location (301)
    #[error("Moved permanently to {0}")]
    MovedPermanently(String),

    /// No representation matches the Accept header (406)
    #[error("Not acceptable")]
    NotAcceptable,

    /// Inbox bodies must be activity+json (415)
    #[error("Unsupported media type")]
    UnsupportedMediaType,

    /// Remote actor could not be fetched or decoded (500)
    #[error("Unreachable actor: {0}")]
    UnreachableActor(String),

    /// Remote inbox refused or never answered the delivery (500)
    #[error("Delivery to {inbox} failed{}", status_suffix(.status))]
    DeliveryFailed { inbox: String, status: Option<u16> },

    /// The request that owned the operation went away (500)
    #[error("Operation cancelled")]
    Cancelled,

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Non-SQL storage error (500)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" with status {code}"))
        .unwrap_or_default()
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(err.into())
    }
}

impl AppError {
    /// Short label used for metrics and structured logs
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::MalformedPayload(_) => "malformed_payload",
            AppError::VerificationFailed(_) => "verification_failed",
            AppError::Validation(_) => "validation",
            AppError::Unauthorized => "unauthorized",
            AppError::NotFound => "not_found",
            AppError::MovedPermanently(_) => "moved_permanently",
            AppError::NotAcceptable => "not_acceptable",
            AppError::UnsupportedMediaType => "unsupported_media_type",
            AppError::UnreachableActor(_) => "unreachable_actor",
            AppError::DeliveryFailed { .. } => "delivery_failed",
            AppError::Cancelled => "cancelled",
            AppError::Database(_) => "database",
            AppError::Storage(_) => "storage",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload(_)
            | AppError::VerificationFailed(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MovedPermanently(_) => StatusCode::MOVED_PERMANENTLY,
            AppError::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            AppError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::UnreachableActor(_)
            | AppError::DeliveryFailed { .. }
            | AppError::Cancelled
            | AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Storage and internal failures are reported with a generic message;
    /// the detail goes to the log instead.
    fn into_response(self) -> Response {
        use axum::Json;

        let status = self.status_code();
        let error_type = self.error_type();
        let error_message = match &self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, error_type, "Request failed");
        } else {
            tracing::debug!(error = %self, error_type, "Request rejected");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        if let AppError::MovedPermanently(location) = self {
            return (status, [(header::LOCATION, location)]).into_response();
        }

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn federation_failures_map_to_expected_statuses() {
        assert_eq!(
            AppError::MalformedPayload("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::VerificationFailed("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::DeliveryFailed {
                inbox: "https://remote.example/inbox".into(),
                status: Some(403),
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn delivery_failure_message_includes_status_when_known() {
        let with_status = AppError::DeliveryFailed {
            inbox: "https://remote.example/inbox".into(),
            status: Some(410),
        };
        assert_eq!(
            with_status.to_string(),
            "Delivery to https://remote.example/inbox failed with status 410"
        );

        let without_status = AppError::DeliveryFailed {
            inbox: "https://remote.example/inbox".into(),
            status: None,
        };
        assert_eq!(
            without_status.to_string(),
            "Delivery to https://remote.example/inbox failed"
        );
    }

    #[test]
    fn moved_permanently_sets_location_header() {
        let response = AppError::MovedPermanently("/users/u1/inbox".into()).into_response();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/users/u1/inbox"
        );
    }

    #[test]
    fn migration_failure_is_a_database_error() {
        let err = AppError::from(sqlx::migrate::MigrateError::VersionMissing(1));
        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(err.error_type(), "database");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
