//! Error classification
//!
//! Failures are reduced to an [`ErrorSignal`] (code, HTTP status, message) and
//! matched against an ordered rule list. The first matching rule wins.

use chat_core::{ActorId, ErrorCategory, RecoveryAction, RoomId, Severity};
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

use super::stats::ErrorStats;

/// System error codes that always classify as network failures
pub const NETWORK_CODES: [&str; 4] = ["ECONNREFUSED", "ENOTFOUND", "ETIMEDOUT", "ECONNRESET"];

/// The observable parts of a failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorSignal {
    /// System-level code such as `ECONNRESET`
    pub code: Option<String>,
    /// HTTP status when the failure came from an HTTP exchange
    pub status: Option<u16>,
    pub message: String,
    /// Set when the failure is known to be a decode error
    pub parse_failure: bool,
    /// Invalid input or misuse; repeating the call cannot succeed
    pub permanent: bool,
}

impl ErrorSignal {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// A decode failure
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            parse_failure: true,
            ..Self::new(message)
        }
    }

    /// A failure that must not be retried
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            permanent: true,
            ..Self::new(message)
        }
    }

    /// Derive a signal from any error, walking its source chain for I/O causes
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let mut signal = Self::new(err.to_string());
        let mut current: Option<&(dyn StdError + 'static)> = Some(err);
        while let Some(cause) = current {
            if let Some(io_err) = cause.downcast_ref::<io::Error>() {
                signal.code = io_code(io_err.kind()).map(str::to_string);
                break;
            }
            current = cause.source();
        }
        signal
    }

    /// Whether the code or message looks like a connectivity problem
    ///
    /// Only the system codes in [`NETWORK_CODES`] count; other codes fall
    /// back to the message.
    #[must_use]
    pub fn is_network_like(&self) -> bool {
        const HINTS: [&str; 10] = [
            "network",
            "timeout",
            "timed out",
            "connection",
            "socket",
            "dns",
            "unreachable",
            "refused",
            "broken pipe",
            "eof",
        ];

        if self.permanent {
            return false;
        }
        if self
            .code
            .as_deref()
            .is_some_and(|code| NETWORK_CODES.contains(&code))
        {
            return true;
        }
        let message = self.message.to_lowercase();
        HINTS.iter().any(|hint| message.contains(hint))
    }
}

impl fmt::Display for ErrorSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(status) = self.status {
            write!(f, " (status {status})")?;
        }
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        Ok(())
    }
}

impl StdError for ErrorSignal {}

/// Map an I/O error kind to the matching system code
#[must_use]
pub fn io_code(kind: io::ErrorKind) -> Option<&'static str> {
    match kind {
        io::ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => Some("ECONNRESET"),
        io::ErrorKind::TimedOut => Some("ETIMEDOUT"),
        io::ErrorKind::NotFound | io::ErrorKind::AddrNotAvailable => Some("ENOTFOUND"),
        _ => None,
    }
}

/// Errors that can describe themselves to the classifier
pub trait Classify {
    fn signal(&self) -> ErrorSignal;
}

impl Classify for ErrorSignal {
    fn signal(&self) -> ErrorSignal {
        self.clone()
    }
}

impl Classify for io::Error {
    fn signal(&self) -> ErrorSignal {
        let signal = ErrorSignal::new(self.to_string());
        match io_code(self.kind()) {
            Some(code) => signal.with_code(code),
            None => signal,
        }
    }
}

impl Classify for chat_core::DomainError {
    fn signal(&self) -> ErrorSignal {
        ErrorSignal::permanent(self.to_string()).with_code(self.code())
    }
}

/// Where a failure happened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub operation: Option<String>,
    pub component: Option<String>,
    pub room_id: Option<RoomId>,
    pub actor_id: Option<ActorId>,
    /// Name of the third-party integration involved, if any
    pub integration: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    #[must_use]
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    #[must_use]
    pub fn room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }

    #[must_use]
    pub fn actor(mut self, actor_id: Option<ActorId>) -> Self {
        self.actor_id = actor_id;
        self
    }

    #[must_use]
    pub fn integration(mut self, name: impl Into<String>) -> Self {
        self.integration = Some(name.into());
        self
    }

    fn component_is(&self, names: &[&str]) -> bool {
        self.component
            .as_deref()
            .is_some_and(|c| names.iter().any(|n| c.eq_ignore_ascii_case(n)))
    }

    /// Whether any `.`, `:` or `_` separated segment of the operation is `api`
    fn operation_is_api(&self) -> bool {
        self.operation.as_deref().is_some_and(|op| {
            op.split(['.', ':', '_', '/'])
                .any(|segment| segment.eq_ignore_ascii_case("api"))
        })
    }
}

/// A failure after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub signal: ErrorSignal,
}

impl ClassifiedError {
    #[must_use]
    pub fn recovery_actions(&self) -> &'static [RecoveryAction] {
        self.category.recovery_actions()
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.signal.message
    }
}

/// Pick a category for a signal; pure and side-effect free
///
/// Rules are checked in order: network codes, websocket/transport, API,
/// auth, integration, parsing, render, storage. Anything unmatched is NETWORK.
#[must_use]
pub fn categorize(signal: &ErrorSignal, context: &ErrorContext) -> ErrorCategory {
    let message = signal.message.to_lowercase();

    if signal
        .code
        .as_deref()
        .is_some_and(|code| NETWORK_CODES.contains(&code))
    {
        return ErrorCategory::Network;
    }

    if message.contains("websocket") || context.component_is(&["websocket", "transport"]) {
        return ErrorCategory::Transport;
    }

    // Checked before AUTH, so a 401 from an HTTP exchange lands here
    if context.operation_is_api() || signal.status.is_some_and(|s| s >= 400) {
        return ErrorCategory::Api;
    }

    if matches!(signal.status, Some(401 | 403)) || message.contains("auth") {
        return ErrorCategory::Auth;
    }

    if context.integration.is_some() {
        return ErrorCategory::Integration;
    }

    if signal.parse_failure || message.contains("json") || message.contains("parse") {
        return ErrorCategory::Parsing;
    }

    if context.component_is(&["renderer", "render"]) {
        return ErrorCategory::Render;
    }

    if message.contains("storage") || message.contains("quota") {
        return ErrorCategory::Storage;
    }

    ErrorCategory::Network
}

/// Classifier with append-only per-category statistics
///
/// Statistics are never consulted when classifying.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    stats: Arc<ErrorStats>,
}

impl ErrorClassifier {
    pub fn new(stats: Arc<ErrorStats>) -> Self {
        Self { stats }
    }

    /// Classify a failure and count it
    pub fn classify(&self, signal: ErrorSignal, context: &ErrorContext) -> ClassifiedError {
        let category = categorize(&signal, context);
        self.stats.record(category);

        ClassifiedError {
            category,
            severity: category.severity(),
            signal,
        }
    }

    pub fn stats(&self) -> &Arc<ErrorStats> {
        &self.stats
    }
}
