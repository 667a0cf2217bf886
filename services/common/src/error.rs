//! Error types for gatewarden services
//!
//! A unified error enum with helpers for HTTP status mapping and
//! retryability checks. Backing-store failures are representable but are
//! normally absorbed at the call site rather than surfaced to clients.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for gatewarden services
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found<E: Into<String>, I: Into<String>>(entity: E, id: I) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Error::Unauthorized(msg.into())
    }

    /// Create a forbidden error
    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        Error::Forbidden(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a rate limited error
    pub fn rate_limited<S: Into<String>>(msg: S) -> Self {
        Error::RateLimited(msg.into())
    }

    /// Create an event bus error
    pub fn event_bus<S: Into<String>>(msg: S) -> Self {
        Error::EventBus(msg.into())
    }

    /// Create an external service error
    pub fn external_service<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Error::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database(_)
                | Error::Redis(_)
                | Error::EventBus(_)
                | Error::Timeout(_)
                | Error::ExternalService { .. }
                | Error::RateLimited(_)
        )
    }

    /// Check if error is a client error (4xx equivalent)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::NotFound { .. }
                | Error::Unauthorized(_)
                | Error::Forbidden(_)
        )
    }

    /// Get the HTTP status code equivalent
    pub fn http_status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::NotFound { .. } => 404,
            Error::RateLimited(_) => 429,
            Error::Config(_)
            | Error::Database(_)
            | Error::Redis(_)
            | Error::EventBus(_)
            | Error::Internal(_) => 500,
            Error::ExternalService { .. } => 502,
            Error::Timeout(_) => 504,
            Error::Other(_) => 500,
        }
    }

    /// Get a short error code string for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Redis(_) => "REDIS_ERROR",
            Error::EventBus(_) => "EVENT_BUS_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::RateLimited(_) => "RATE_LIMITED",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Error::Timeout(_) => "TIMEOUT",
            Error::Other(_) => "UNKNOWN_ERROR",
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Error::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::not_found("User", "123");
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert_eq!(err.http_status_code(), 404);
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_policy_denials() {
        let forbidden = Error::forbidden("ip blocked");
        assert_eq!(forbidden.http_status_code(), 403);

        let limited = Error::rate_limited("rate limit exceeded");
        assert_eq!(limited.http_status_code(), 429);
        assert!(limited.is_retryable());
    }

    #[test]
    fn test_backing_store_errors_are_retryable() {
        let timeout = Error::timeout("persistence write-back timed out");
        assert!(timeout.is_retryable());
        assert_eq!(timeout.http_status_code(), 504);

        let bus = Error::event_bus("broker unreachable");
        assert!(bus.is_retryable());
        assert_eq!(bus.error_code(), "EVENT_BUS_ERROR");
    }

    #[test]
    fn test_external_service_error() {
        let err = Error::external_service("backend", "connection refused");
        assert_eq!(err.http_status_code(), 502);
        assert!(err.is_retryable());
        assert!(!err.is_client_error());
    }
}
