//! Error taxonomy shared by the session layer, the stores and the handlers
//!
//! Every request-time failure is an [`AppError`]. Its `ResponseError`
//! implementation decides the HTTP status, so stages and handlers can use `?`
//! and still answer with a consistent JSON body.

use crate::utils::responses::ResponseBuilder;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

/// Result alias used across the crate
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The session exists but `now >= expires_at`
    #[error("Session expired")]
    SessionExpired,

    /// No session cookie, or the store has no record for it
    #[error("Session not found")]
    SessionNotFound,

    /// Mutating request without a token that verifies against its session
    #[error("CSRF token missing or does not match the session")]
    CsrfMismatch,

    /// The identity provider refused the grant or could not be reached
    #[error("Identity provider error: {0}")]
    AuthProvider(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The backing store failed; request-scoped at runtime, fatal at startup
    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Session failures that should also clear the client's `sessionId` cookie
    #[must_use]
    pub const fn is_session_failure(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::SessionNotFound)
    }

    /// Stable machine-readable code placed in the JSON body
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::SessionExpired => "session_expired",
            Self::SessionNotFound => "unauthorized",
            Self::CsrfMismatch => "csrf_mismatch",
            Self::AuthProvider(_) => "authentication_failed",
            Self::NotFound(_) => "not_found",
            Self::DatabaseUnavailable(_) => "service_unavailable",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) | Self::Internal(_) => "server_error",
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        Self::DatabaseUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("Stored record could not be decoded: {err}"))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionExpired | Self::SessionNotFound | Self::AuthProvider(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::CsrfMismatch => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DatabaseUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Infrastructure details stay in the log, not in the body
        let message = match self {
            Self::DatabaseUnavailable(detail) => {
                log::error!("Database unavailable: {detail}");
                "The service is temporarily unavailable".to_string()
            }
            Self::Configuration(detail) | Self::Internal(detail) => {
                log::error!("Internal failure: {detail}");
                "An internal server error occurred".to_string()
            }
            other => other.to_string(),
        };

        ResponseBuilder::error(self.status_code())
            .with_error_code(self.error_code())
            .with_message(&message)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_errors_map_to_unauthorized() {
        assert_eq!(
            AppError::SessionExpired.error_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::SessionNotFound.error_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert!(AppError::SessionExpired.is_session_failure());
        assert!(!AppError::CsrfMismatch.is_session_failure());
    }

    #[test]
    fn test_csrf_mismatch_is_forbidden() {
        let response = AppError::CsrfMismatch.error_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_database_unavailable_is_request_scoped_503() {
        let err = AppError::DatabaseUnavailable("connection refused".to_string());
        assert_eq!(err.error_response().status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_code(), "service_unavailable");
    }

    #[test]
    fn test_not_found_code() {
        let err = AppError::NotFound("GET /nowhere".to_string());
        assert_eq!(err.error_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Not found: GET /nowhere");
    }
}
