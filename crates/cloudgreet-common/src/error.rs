//! Error types for CloudGreet

use thiserror::Error;

/// Main error type for CloudGreet
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("{0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for CloudGreet
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Shorthand for a missing entity
    pub fn not_found(entity: &str) -> Self {
        Error::NotFound(format!("{} not found", entity))
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Auth(_) => 401,
            Error::Validation(_) => 422,
            Error::NotFound(_) => 404,
            Error::PermissionDenied(_) => 403,
            Error::InvalidTransition { .. } => 409,
            Error::Conflict(_) => 409,
            Error::RateLimitExceeded => 429,
            Error::Dispatch(_) => 502,
            Error::Crypto(_) => 500,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Auth(_) => "UNAUTHORIZED",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::PermissionDenied(_) => "FORBIDDEN",
            Error::InvalidTransition { .. } => "INVALID_TRANSITION",
            Error::Conflict(_) => "CONFLICT",
            Error::RateLimitExceeded => "RATE_LIMITED",
            Error::Dispatch(_) => "DISPATCH_ERROR",
            Error::Crypto(_) => "CRYPTO_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the message is safe to show to API clients
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation("name is required").status_code(), 422);
        assert_eq!(Error::not_found("Sequence").status_code(), 404);
        assert_eq!(
            Error::InvalidTransition {
                from: "active".into(),
                to: "draft".into()
            }
            .status_code(),
            409
        );
        assert_eq!(Error::Database("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_validation_message_is_bare() {
        let err = Error::validation("Sequence name is required");
        assert_eq!(err.to_string(), "Sequence name is required");
        assert!(err.is_client_error());
        assert!(!Error::Internal("x".into()).is_client_error());
    }
}
