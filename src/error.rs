/// Unified error types for the Waypost patrol server
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the patrol core
#[derive(Error, Debug)]
pub enum PatrolError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unknown code, device, point or binding
    #[error("Not found: {0}")]
    NotFound(String),

    /// Binding code past its TTL
    #[error("Expired: {0}")]
    Expired(String),

    /// Device already has an active binding
    #[error("Already bound: {0}")]
    AlreadyBound(String),

    /// Operation requires an active binding but the device is unbound
    #[error("Not bound: {0}")]
    NotBound(String),

    /// Wrong password or invalid device token
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Check-in rejected inside the cooldown window
    #[error("Duplicate check-in, {cooldown_seconds}s cooldown remaining")]
    Cooldown {
        cooldown_seconds: i64,
        last_scan_at: DateTime<Utc>,
    },

    /// Validation errors (missing or malformed fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Admin token errors
    #[error("JWT error: {0}")]
    Jwt(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
///
/// `cooldown_seconds` and `last_scan_at` are populated only for cooldown
/// rejections; clients display the remaining wait to the scanner.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scan_at: Option<DateTime<Utc>>,
}

/// Convert PatrolError to HTTP response
impl IntoResponse for PatrolError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            PatrolError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            PatrolError::Expired(_) => (StatusCode::BAD_REQUEST, "Expired", self.to_string()),
            PatrolError::AlreadyBound(_) => {
                (StatusCode::CONFLICT, "AlreadyBound", self.to_string())
            }
            PatrolError::NotBound(_) => (StatusCode::NOT_FOUND, "NotBound", self.to_string()),
            PatrolError::InvalidCredential(_) => (
                StatusCode::UNAUTHORIZED,
                "InvalidCredential",
                self.to_string(),
            ),
            PatrolError::Cooldown { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "Cooldown", self.to_string())
            }
            PatrolError::Validation(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "InvalidRequest",
                self.to_string(),
            ),
            PatrolError::Jwt(_) => (StatusCode::UNAUTHORIZED, "InvalidToken", self.to_string()),
            PatrolError::Database(_) | PatrolError::Internal(_) | PatrolError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let (cooldown_seconds, last_scan_at) = match &self {
            PatrolError::Cooldown {
                cooldown_seconds,
                last_scan_at,
            } => (Some(*cooldown_seconds), Some(*last_scan_at)),
            _ => (None, None),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            cooldown_seconds,
            last_scan_at,
        });

        (status, body).into_response()
    }
}

/// Result type alias for patrol operations
pub type PatrolResult<T> = Result<T, PatrolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_maps_to_429() {
        let err = PatrolError::Cooldown {
            cooldown_seconds: 30,
            last_scan_at: Utc::now(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_internal_errors_do_not_leak() {
        let err = PatrolError::Internal("connection string with secrets".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_already_bound_is_conflict() {
        let err = PatrolError::AlreadyBound("device".to_string());
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
