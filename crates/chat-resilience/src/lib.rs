//! # chat-resilience
//!
//! Retry, backoff, circuit breaking and error classification for the
//! real-time connection layer.
//!
//! - [`backoff`]: delay computation from named presets
//! - [`breaker`]: per-resource circuit breakers
//! - [`classify`]: error taxonomy mapping and statistics
//! - [`retry`]: the retry executor tying the above together
//! - [`metrics`]: the sink every component reports to

pub mod backoff;
pub mod breaker;
pub mod classify;
pub mod error_log;
pub mod metrics;
pub mod monitor;
pub mod registry;
pub mod retry;

pub use backoff::{BackoffConfig, BackoffPresets};
pub use breaker::{
    BreakerError, BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig,
    CircuitState,
};
pub use classify::{
    categorize, ClassifiedError, Classify, ErrorClassifier, ErrorContext, ErrorRateSignal,
    ErrorSignal, ErrorStats, RateLevel,
};
pub use error_log::{ErrorLog, ErrorRecord};
pub use metrics::{MetricsSink, NoopMetricsSink, TracingMetricsSink};
pub use monitor::{check_error_rates, spawn_error_rate_monitor};
pub use registry::ResilienceRegistry;
pub use retry::{
    default_should_retry, RetryContext, RetryError, RetryExecutor, RetryOptions, RetryOutcome,
    RetryReport,
};
