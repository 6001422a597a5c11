//! Domain errors - programmer and configuration errors that fail fast

use thiserror::Error;

/// Domain layer errors
///
/// These are never retried: they indicate invalid input or a call made in a
/// state that does not permit it.
#[derive(Debug, Error)]
pub enum DomainError {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid backoff preset '{name}': {reason}")]
    InvalidPreset { name: String, reason: String },

    #[error("Unknown backoff preset: {0}")]
    UnknownPreset(String),

    // =========================================================================
    // State Errors
    // =========================================================================
    #[error("Invalid state: {state} does not allow {action}")]
    InvalidState { state: String, action: String },

    #[error("Session closed")]
    SessionClosed,
}

impl DomainError {
    /// Get an error code string for logs and metrics
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::InvalidPreset { .. } => "INVALID_PRESET",
            Self::UnknownPreset(_) => "UNKNOWN_PRESET",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::SessionClosed => "SESSION_CLOSED",
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl std::fmt::Debug, action: impl Into<String>) -> Self {
        Self::InvalidState {
            state: format!("{state:?}"),
            action: action.into(),
        }
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::InvalidPreset { .. } | Self::UnknownPreset(_)
        )
    }
}
