//! Retry executor
//!
//! Runs an async operation up to `max_attempts` times. Every failure is
//! classified and appended to the error log before deciding whether to try
//! again. Delays come from the backoff preset named in [`RetryOptions`] and
//! only suspend the calling task.

use chat_core::{DomainError, ErrorCategory, RecoveryAction};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::BackoffConfig;
use crate::breaker::{BreakerError, CircuitBreaker, CircuitState};
use crate::classify::{ClassifiedError, Classify, ErrorContext};
use crate::registry::ResilienceRegistry;
use chat_common::config::DEFAULT_PRESET;

/// Per-attempt decision whether to keep going
pub type RetryPredicate = Arc<dyn Fn(&ClassifiedError, &RetryContext) -> bool + Send + Sync>;

/// State of one retry loop, visible to the retry predicate
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub operation: String,
    pub preset: String,
    /// 1-based number of the attempt that just ran
    pub attempt: u32,
    pub max_attempts: u32,
    pub started_at: Instant,
    pub last_error: Option<ClassifiedError>,
}

impl RetryContext {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// How to run one operation
#[derive(Clone)]
pub struct RetryOptions {
    pub operation: String,
    pub preset: String,
    /// Overrides the preset's backoff entirely
    pub backoff: Option<BackoffConfig>,
    /// Overrides the backoff's attempt limit
    pub max_attempts: Option<u32>,
    pub context: ErrorContext,
    should_retry: Option<RetryPredicate>,
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("operation", &self.operation)
            .field("preset", &self.preset)
            .field("backoff", &self.backoff)
            .field("max_attempts", &self.max_attempts)
            .field("context", &self.context)
            .field("custom_predicate", &self.should_retry.is_some())
            .finish()
    }
}

impl RetryOptions {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            preset: DEFAULT_PRESET.to_string(),
            backoff: None,
            max_attempts: None,
            context: ErrorContext::default(),
            should_retry: None,
        }
    }

    #[must_use]
    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = Some(backoff);
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    #[must_use]
    pub fn context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn should_retry<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ClassifiedError, &RetryContext) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    fn decide(&self, error: &ClassifiedError, ctx: &RetryContext) -> bool {
        match &self.should_retry {
            Some(predicate) => predicate(error, ctx),
            None => default_should_retry(error, ctx),
        }
    }

    /// Error context with the operation name filled in
    fn error_context(&self) -> ErrorContext {
        let mut context = self.context.clone();
        if context.operation.is_none() {
            context.operation = Some(self.operation.clone());
        }
        context
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

/// Category-specific default retry rule
///
/// API retries only 408, 429 and 5xx. NETWORK retries only connectivity
/// problems. Categories whose recovery actions exclude retry never retry,
/// and neither do permanent failures.
pub fn default_should_retry(error: &ClassifiedError, _ctx: &RetryContext) -> bool {
    let signal = &error.signal;
    if signal.permanent {
        return false;
    }
    match error.category {
        ErrorCategory::Api => match signal.status {
            Some(status) => is_retryable_status(status),
            None => signal.is_network_like(),
        },
        ErrorCategory::Integration => signal.status.is_none_or(is_retryable_status),
        ErrorCategory::Network => signal.is_network_like(),
        category => category.allows(RecoveryAction::Retry),
    }
}

/// How a retry loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOutcome {
    /// First attempt succeeded
    Succeeded,
    /// Succeeded after at least one failure
    Recovered,
    /// Ran out of attempts
    Exhausted,
    /// The predicate refused to retry
    Aborted,
    /// The circuit breaker rejected the call
    ShortCircuited,
}

impl RetryOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Recovered => "recovered",
            Self::Exhausted => "exhausted",
            Self::Aborted => "aborted",
            Self::ShortCircuited => "short_circuited",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded | Self::Recovered)
    }
}

/// Summary of one retry loop, sent to the metrics sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryReport {
    pub operation: String,
    pub preset: String,
    /// Attempts that actually ran the operation
    pub attempts: u32,
    pub failures: u32,
    pub outcome: RetryOutcome,
    pub elapsed: Duration,
    pub last_category: Option<ErrorCategory>,
}

/// Retry loop errors
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("{operation} failed after {attempts} attempts: {error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        category: ErrorCategory,
        error: E,
    },

    #[error("{operation} failed with non-retryable {category} error: {error}")]
    Aborted {
        operation: String,
        attempt: u32,
        category: ErrorCategory,
        error: E,
    },

    #[error("circuit breaker '{name}' is open")]
    CircuitOpen { name: String, attempts: u32 },

    #[error(transparent)]
    Invalid(#[from] DomainError),
}

impl<E> RetryError<E> {
    /// The operation's last error, if it ran at all
    pub fn into_error(self) -> Option<E> {
        match self {
            Self::Exhausted { error, .. } | Self::Aborted { error, .. } => Some(error),
            Self::CircuitOpen { .. } | Self::Invalid(_) => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { error, .. } | Self::Aborted { error, .. } => Some(error),
            Self::CircuitOpen { .. } | Self::Invalid(_) => None,
        }
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Exhausted { category, .. } | Self::Aborted { category, .. } => Some(*category),
            Self::CircuitOpen { .. } | Self::Invalid(_) => None,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Drives operations through backoff, classification and circuit breakers
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    registry: Arc<ResilienceRegistry>,
}

impl RetryExecutor {
    pub fn new(registry: Arc<ResilienceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ResilienceRegistry> {
        &self.registry
    }

    pub async fn run<T, E, F, Fut>(
        &self,
        options: &RetryOptions,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        self.execute(options, None, operation).await.0
    }

    /// Like [`run`](Self::run), also returning the loop summary
    pub async fn run_with_report<T, E, F, Fut>(
        &self,
        options: &RetryOptions,
        breaker: Option<&str>,
        operation: F,
    ) -> (Result<T, RetryError<E>>, RetryReport)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let breaker = breaker.map(|name| self.registry.breakers().get_or_create(name));
        self.execute(options, breaker, operation).await
    }

    /// Run with retries; if every attempt fails, try the fallback once
    ///
    /// A failing fallback yields the original retry error.
    pub async fn run_with_fallback<T, E, F, Fut, G, GFut>(
        &self,
        options: &RetryOptions,
        operation: F,
        fallback: G,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        match self.run(options, operation).await {
            Ok(value) => Ok(value),
            Err(err) => match fallback().await {
                Ok(value) => {
                    info!(operation = %options.operation, "fallback succeeded after retry failure");
                    Ok(value)
                }
                Err(fallback_err) => {
                    debug!(
                        operation = %options.operation,
                        error = %fallback_err,
                        "fallback failed"
                    );
                    Err(err)
                }
            },
        }
    }

    /// Run every attempt through the named circuit breaker
    ///
    /// An open breaker ends the loop at once without consuming an attempt.
    pub async fn run_with_circuit_breaker<T, E, F, Fut>(
        &self,
        breaker: &str,
        options: &RetryOptions,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        self.run_with_report(options, Some(breaker), operation)
            .await
            .0
    }

    async fn execute<T, E, F, Fut>(
        &self,
        options: &RetryOptions,
        breaker: Option<Arc<CircuitBreaker>>,
        mut operation: F,
    ) -> (Result<T, RetryError<E>>, RetryReport)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let backoff = options
            .backoff
            .unwrap_or_else(|| *self.registry.presets().get(&options.preset));
        let max_attempts = options.max_attempts.unwrap_or(backoff.max_attempts);
        let error_context = options.error_context();

        let mut ctx = RetryContext {
            operation: options.operation.clone(),
            preset: options.preset.clone(),
            attempt: 0,
            max_attempts,
            started_at: Instant::now(),
            last_error: None,
        };
        let mut executed = 0;
        let mut failures = 0;

        let result = if max_attempts == 0 {
            Err(RetryError::Invalid(DomainError::invalid_argument(
                "max attempts must be >= 1",
            )))
        } else {
            loop {
                ctx.attempt += 1;

                let outcome = match &breaker {
                    Some(breaker) => breaker.call(&mut operation).await,
                    None => operation().await.map_err(BreakerError::Operation),
                };

                let error = match outcome {
                    Ok(value) => {
                        executed += 1;
                        break Ok(value);
                    }
                    Err(BreakerError::Open { name }) => {
                        debug!(
                            operation = %ctx.operation,
                            breaker = %name,
                            "circuit open, not attempting"
                        );
                        break Err(RetryError::CircuitOpen {
                            name,
                            attempts: executed,
                        });
                    }
                    Err(BreakerError::Operation(error)) => {
                        executed += 1;
                        error
                    }
                };

                failures += 1;
                let (classified, record) =
                    self.registry
                        .record_error(error.signal(), &error_context, Some(ctx.attempt));
                let category = classified.category;
                ctx.last_error = Some(classified);

                if ctx.attempt >= max_attempts {
                    warn!(
                        operation = %ctx.operation,
                        attempts = ctx.attempt,
                        %category,
                        error = %error,
                        "retries exhausted"
                    );
                    break Err(RetryError::Exhausted {
                        operation: ctx.operation.clone(),
                        attempts: ctx.attempt,
                        category,
                        error,
                    });
                }

                if let Some(breaker) = breaker
                    .as_ref()
                    .filter(|b| b.state() == CircuitState::Open)
                {
                    debug!(
                        operation = %ctx.operation,
                        breaker = %breaker.name(),
                        "circuit opened mid-sequence"
                    );
                    break Err(RetryError::CircuitOpen {
                        name: breaker.name().to_string(),
                        attempts: executed,
                    });
                }

                let retry = ctx
                    .last_error
                    .as_ref()
                    .is_some_and(|last| options.decide(last, &ctx));
                if !retry {
                    debug!(operation = %ctx.operation, %category, "error is not retryable");
                    break Err(RetryError::Aborted {
                        operation: ctx.operation.clone(),
                        attempt: ctx.attempt,
                        category,
                        error,
                    });
                }

                let delay = match backoff.delay(ctx.attempt) {
                    Ok(delay) => delay,
                    Err(err) => break Err(RetryError::Invalid(err)),
                };
                self.registry.error_log().mark_recovery_attempted(record.id);
                debug!(
                    operation = %ctx.operation,
                    attempt = ctx.attempt,
                    delay_ms = delay.as_millis() as u64,
                    %category,
                    error = %error,
                    "retrying"
                );
                tokio::time::sleep(delay).await;
            }
        };

        let outcome = match &result {
            Ok(_) if failures == 0 => RetryOutcome::Succeeded,
            Ok(_) => RetryOutcome::Recovered,
            Err(RetryError::Exhausted { .. }) => RetryOutcome::Exhausted,
            Err(RetryError::CircuitOpen { .. }) => RetryOutcome::ShortCircuited,
            Err(RetryError::Aborted { .. } | RetryError::Invalid(_)) => RetryOutcome::Aborted,
        };
        let report = RetryReport {
            operation: ctx.operation.clone(),
            preset: ctx.preset.clone(),
            attempts: executed,
            failures,
            outcome,
            elapsed: ctx.elapsed(),
            last_category: ctx.last_error.as_ref().map(|e| e.category),
        };
        self.registry.sink().retry_completed(&report);

        (result, report)
    }
}
