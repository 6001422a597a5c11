//! Circuit breaker
//!
//! # States
//!
//! ```text
//!                    ┌─────────┐
//!          ┌────────>│ Closed  │<────────┐
//!          │         └─────────┘         │
//!          │   failure_threshold         │ 3 successes
//!          │   consecutive failures      │
//!          │              v              │
//!     any  │         ┌─────────┐         │
//!   failure│         │  Open   │         │
//!          │         └─────────┘         │
//!          │   recovery_timeout since    │
//!          │   the last failure          │
//!          │              v              │
//!          │         ┌──────────┐        │
//!          └─────────┤Half-Open │────────┘
//!                    └──────────┘
//! ```
//!
//! While open, calls fail without invoking the operation. The Open to
//! Half-Open transition happens lazily on the next call once the recovery
//! timeout has elapsed.
//!
//! Every outcome is also appended to a timestamped history used for the error
//! rate. Entries older than the monitoring window are purged before each rate
//! computation and the history never exceeds `max_history` entries.

use chat_common::config::BreakerSettings;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics::MetricsSink;

/// Successful half-open calls needed to close the breaker
pub const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 3;

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub monitoring_window: Duration,
    pub max_history: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&BreakerSettings::default())
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            recovery_timeout: settings.recovery_timeout(),
            monitoring_window: settings.monitoring_window(),
            max_history: settings.max_history.max(1),
        }
    }
}

/// Errors returned through a breaker
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// The operation's error, if the operation ran
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(err) => Some(err),
            Self::Open { .. } => None,
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub error_rate: f64,
    pub samples: usize,
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    history: VecDeque<(Instant, bool)>,
}

impl BreakerCore {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            history: VecDeque::new(),
        }
    }

    fn push_history(&mut self, at: Instant, success: bool, max_history: usize) {
        if self.history.len() >= max_history {
            self.history.pop_front();
        }
        self.history.push_back((at, success));
    }

    fn purge(&mut self, now: Instant, window: Duration) {
        while self
            .history
            .front()
            .is_some_and(|(at, _)| now.saturating_duration_since(*at) > window)
        {
            self.history.pop_front();
        }
    }
}

/// A named circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    core: Mutex<BreakerCore>,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            core: Mutex::new(BreakerCore::new()),
            sink: None,
        }
    }

    /// Report state transitions to a metrics sink
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.core.lock().state
    }

    /// Ask permission to run an operation
    ///
    /// Moves Open to Half-Open once the recovery timeout has elapsed.
    pub fn try_acquire(&self) -> Result<(), BreakerError<std::convert::Infallible>> {
        let transition = {
            let mut core = self.core.lock();
            match core.state {
                CircuitState::Closed | CircuitState::HalfOpen => None,
                CircuitState::Open => {
                    let recovered = core
                        .last_failure
                        .is_none_or(|at| at.elapsed() >= self.config.recovery_timeout);
                    if !recovered {
                        return Err(BreakerError::Open {
                            name: self.name.clone(),
                        });
                    }
                    core.state = CircuitState::HalfOpen;
                    core.success_count = 0;
                    Some((CircuitState::Open, CircuitState::HalfOpen))
                }
            }
        };

        self.notify(transition);
        Ok(())
    }

    pub fn record_success(&self) {
        let transition = {
            let mut core = self.core.lock();
            let now = Instant::now();
            core.push_history(now, true, self.config.max_history);

            match core.state {
                CircuitState::Closed => {
                    core.failure_count = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    core.success_count += 1;
                    if core.success_count >= HALF_OPEN_SUCCESS_THRESHOLD {
                        core.state = CircuitState::Closed;
                        core.failure_count = 0;
                        core.success_count = 0;
                        Some((CircuitState::HalfOpen, CircuitState::Closed))
                    } else {
                        None
                    }
                }
                // A call admitted before the breaker opened
                CircuitState::Open => None,
            }
        };

        self.notify(transition);
    }

    pub fn record_failure(&self) {
        let transition = {
            let mut core = self.core.lock();
            let now = Instant::now();
            core.push_history(now, false, self.config.max_history);
            core.last_failure = Some(now);

            match core.state {
                CircuitState::Closed => {
                    core.failure_count += 1;
                    if core.failure_count >= self.config.failure_threshold {
                        core.state = CircuitState::Open;
                        Some((CircuitState::Closed, CircuitState::Open))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    core.state = CircuitState::Open;
                    core.success_count = 0;
                    Some((CircuitState::HalfOpen, CircuitState::Open))
                }
                CircuitState::Open => None,
            }
        };

        self.notify(transition);
    }

    /// Failures divided by samples inside the monitoring window (0 when empty)
    pub fn error_rate(&self) -> f64 {
        let mut core = self.core.lock();
        core.purge(Instant::now(), self.config.monitoring_window);
        rate(&core.history)
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut core = self.core.lock();
        core.purge(Instant::now(), self.config.monitoring_window);
        BreakerSnapshot {
            name: self.name.clone(),
            state: core.state,
            failure_count: core.failure_count,
            success_count: core.success_count,
            error_rate: rate(&core.history),
            samples: core.history.len(),
        }
    }

    /// Force the breaker back to Closed and forget its history
    pub fn reset(&self) {
        let previous = {
            let mut core = self.core.lock();
            let previous = core.state;
            *core = BreakerCore::new();
            previous
        };
        if previous != CircuitState::Closed {
            self.notify(Some((previous, CircuitState::Closed)));
        }
    }

    /// Run an operation through the breaker
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.try_acquire().is_err() {
            return Err(BreakerError::Open {
                name: self.name.clone(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(BreakerError::Operation(err))
            }
        }
    }

    /// Run an operation, substituting the fallback's result when it fails
    ///
    /// The fallback also runs when the breaker rejects the call. If the
    /// fallback fails too, the original error is returned.
    pub async fn call_with_fallback<T, E, F, Fut, G, GFut>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        match self.call(operation).await {
            Ok(value) => Ok(value),
            Err(original) => match fallback().await {
                Ok(value) => {
                    debug!(breaker = %self.name, "fallback used");
                    Ok(value)
                }
                Err(_) => Err(original),
            },
        }
    }

    fn notify(&self, transition: Option<(CircuitState, CircuitState)>) {
        let Some((from, to)) = transition else {
            return;
        };

        if to == CircuitState::Open {
            warn!(breaker = %self.name, %from, "circuit breaker opened");
        } else {
            debug!(breaker = %self.name, %from, %to, "circuit breaker transition");
        }
        if let Some(sink) = &self.sink {
            sink.breaker_transitioned(&self.name, from, to);
        }
    }
}

fn rate(history: &VecDeque<(Instant, bool)>) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    let failures = history.iter().filter(|(_, ok)| !ok).count();
    failures as f64 / history.len() as f64
}
