//! Pusher WebSocket close codes
//!
//! Pusher groups its application close codes into ranges that tell the
//! client how to react. Standard WebSocket codes fall outside these ranges.

use serde::{Deserialize, Serialize};

/// How the client should react to a close code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseClass {
    /// 4000-4099: the connection must not be retried
    Fatal,
    /// 4100-4199: retry after backing off
    Backoff,
    /// 4200-4299: retry straight away
    Immediate,
    /// Any other code, including the standard WebSocket range
    Other,
}

impl CloseClass {
    #[must_use]
    pub const fn of(code: u16) -> Self {
        match code {
            4000..=4099 => Self::Fatal,
            4100..=4199 => Self::Backoff,
            4200..=4299 => Self::Immediate,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub const fn should_reconnect(self) -> bool {
        !matches!(self, Self::Fatal)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Backoff => "backoff",
            Self::Immediate => "immediate",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for CloseClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of the close codes the server documents
#[must_use]
pub const fn description(code: u16) -> Option<&'static str> {
    match code {
        1000 => Some("Normal closure"),
        1001 => Some("Going away"),
        1006 => Some("Abnormal closure"),
        4000 => Some("Application only accepts SSL connections"),
        4001 => Some("Application does not exist"),
        4003 => Some("Application disabled"),
        4004 => Some("Application is over connection quota"),
        4005 => Some("Path not found"),
        4006 => Some("Invalid version string format"),
        4007 => Some("Unsupported protocol version"),
        4008 => Some("No protocol version supplied"),
        4009 => Some("Connection is unauthorized"),
        4100 => Some("Over capacity"),
        4200 => Some("Generic reconnect immediately"),
        4201 => Some("Pong reply not received"),
        4202 => Some("Closed after inactivity"),
        _ => None,
    }
}
