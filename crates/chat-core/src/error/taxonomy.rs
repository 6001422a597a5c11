//! Error taxonomy - the fixed categories every failure is classified into

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified error category
///
/// Each category carries a fixed severity and an ordered list of recovery
/// actions the resilience layer is allowed to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Network,
    Transport,
    Api,
    Parsing,
    Auth,
    Integration,
    Render,
    Storage,
}

impl ErrorCategory {
    /// All categories, in declaration order
    pub const ALL: [Self; 8] = [
        Self::Network,
        Self::Transport,
        Self::Api,
        Self::Parsing,
        Self::Auth,
        Self::Integration,
        Self::Render,
        Self::Storage,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Transport => "TRANSPORT",
            Self::Api => "API",
            Self::Parsing => "PARSING",
            Self::Auth => "AUTH",
            Self::Integration => "INTEGRATION",
            Self::Render => "RENDER",
            Self::Storage => "STORAGE",
        }
    }

    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::Network | Self::Transport => Severity::High,
            Self::Auth => Severity::Critical,
            Self::Api | Self::Integration | Self::Storage => Severity::Medium,
            Self::Parsing | Self::Render => Severity::Low,
        }
    }

    /// Recovery actions in the order they should be tried
    #[must_use]
    pub const fn recovery_actions(self) -> &'static [RecoveryAction] {
        use RecoveryAction::{Fallback, Reauthenticate, Reconnect, Retry, UserIntervention};

        match self {
            Self::Network => &[Retry, Fallback],
            Self::Transport => &[Reconnect, Retry, Fallback],
            Self::Api => &[Retry, Fallback],
            Self::Parsing => &[Fallback],
            Self::Auth => &[Reauthenticate, UserIntervention],
            Self::Integration => &[Retry, Fallback],
            Self::Render => &[Fallback],
            Self::Storage => &[Retry, UserIntervention],
        }
    }

    /// Check whether a recovery action is permitted for this category
    #[must_use]
    pub fn allows(self, action: RecoveryAction) -> bool {
        self.recovery_actions().contains(&action)
    }

    /// Failures of this category need a person to act before they can clear
    #[must_use]
    pub fn requires_user_intervention(self) -> bool {
        self.allows(RecoveryAction::UserIntervention)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recovery actions the resilience layer may take for a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    Reconnect,
    Fallback,
    Reauthenticate,
    UserIntervention,
}

impl RecoveryAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Reconnect => "reconnect",
            Self::Fallback => "fallback",
            Self::Reauthenticate => "reauthenticate",
            Self::UserIntervention => "user_intervention",
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
