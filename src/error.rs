/// Unified error types for the admin gate
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the gate
#[derive(Error, Debug)]
pub enum GateError {
    /// Wrong passphrase for a step
    #[error("Invalid passphrase")]
    InvalidCredentials,

    /// Too many attempts for (ip, step) inside the throttle window
    #[error("Too many attempts. Please try again later.")]
    RateLimited { retry_after: std::time::Duration },

    /// No session token supplied to step 2
    #[error("Session token required. Complete step 1 first.")]
    MissingSession,

    /// Unknown, expired or not-yet-verified session token
    #[error("Invalid or expired session. Start from step 1.")]
    InvalidSession,

    /// Deployment misconfiguration (e.g. no secret for a step)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Missing or invalid bearer credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller lacks the required role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not valid in the resource's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict errors
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Stable machine-readable code for the error body
    pub fn code(&self) -> &'static str {
        match self {
            GateError::InvalidCredentials => "InvalidCredentials",
            GateError::RateLimited { .. } => "RateLimited",
            GateError::MissingSession => "MissingSession",
            GateError::InvalidSession => "InvalidSession",
            GateError::Configuration(_) => "ConfigurationError",
            GateError::Unauthorized(_) => "Unauthorized",
            GateError::Forbidden(_) => "Forbidden",
            GateError::NotFound(_) => "NotFound",
            GateError::InvalidState(_) => "InvalidState",
            GateError::Validation(_) => "InvalidRequest",
            GateError::Conflict(_) => "Conflict",
            GateError::Database(_) | GateError::Io(_) | GateError::Internal(_) => {
                "InternalServerError"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GateError::InvalidCredentials
            | GateError::InvalidSession
            | GateError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GateError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GateError::MissingSession | GateError::Validation(_) => StatusCode::BAD_REQUEST,
            GateError::Forbidden(_) => StatusCode::FORBIDDEN,
            GateError::NotFound(_) => StatusCode::NOT_FOUND,
            GateError::InvalidState(_) | GateError::Conflict(_) => StatusCode::CONFLICT,
            GateError::Configuration(_)
            | GateError::Database(_)
            | GateError::Io(_)
            | GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

/// Convert GateError to HTTP response
impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            GateError::Configuration(detail) => {
                tracing::error!("Configuration error: {}", detail);
                "Internal server error".to_string()
            }
            GateError::Database(_) | GateError::Internal(_) | GateError::Io(_) => {
                tracing::error!("Request failed: {}", self);
                "Internal server error".to_string() // Don't leak details
            }
            _ => self.to_string(),
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                success: false,
                error: message,
                code: self.code().to_string(),
            }),
        )
            .into_response();

        if let GateError::RateLimited { retry_after } = &self {
            if let Ok(value) = retry_after.as_secs().to_string().parse() {
                response.headers_mut().insert("retry-after", value);
            }
        }

        response
    }
}

/// Malformed request bodies keep the JSON error shape
impl From<JsonRejection> for GateError {
    fn from(rejection: JsonRejection) -> Self {
        GateError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for GateError {
    fn from(rejection: QueryRejection) -> Self {
        GateError::Validation(rejection.body_text())
    }
}

/// Result type alias for gate operations
pub type GateResult<T> = Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GateError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(GateError::InvalidSession.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(GateError::MissingSession.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GateError::RateLimited {
                retry_after: std::time::Duration::from_secs(60)
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(GateError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(GateError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(GateError::InvalidState("x".into()).status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_configuration_detail_not_leaked() {
        let response = GateError::Configuration("no secret for step2".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = GateError::RateLimited {
            retry_after: std::time::Duration::from_secs(1800),
        }
        .into_response();
        assert_eq!(response.headers().get("retry-after").unwrap(), "1800");
    }
}
