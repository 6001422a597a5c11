//! Application error types
//!
//! Errors that reach the process boundary. Transport failures inside a running
//! session are never surfaced this way; they become chat events instead.

use chat_core::DomainError;
use std::fmt;

use crate::config::{ConfigError, SettingsError};

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Validation errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Connection errors that escaped the session (e.g. during startup)
    #[error("Connection error: {0}")]
    Connection(String),

    // Authorization errors
    #[error("Authorization failed: {0}")]
    Authorization(String),

    // External service errors
    #[error("External service error: {0}")]
    ExternalService(String),

    // Internal errors
    #[error("Internal error")]
    Internal(#[source] anyhow::Error),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl AppError {
    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            // EX_CONFIG / EX_USAGE
            Self::Config(_) => 78,
            Self::InvalidInput(_) => 64,

            // EX_UNAVAILABLE
            Self::Connection(_) | Self::ExternalService(_) => 69,

            // EX_NOPERM
            Self::Authorization(_) => 77,

            // EX_SOFTWARE
            Self::Internal(_) => 70,

            Self::Domain(e) => {
                if e.is_validation() {
                    64
                } else {
                    70
                }
            }
        }
    }

    /// Get error code for logs
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Authorization(_) => "AUTHORIZATION_FAILED",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Domain(e) => e.code(),
        }
    }

    /// Check if the operation that produced this error may succeed on retry
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::ExternalService(_))
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(msg: impl fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<SettingsError> for AppError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
