//! Metrics hooks
//!
//! The resilience layer and the sessions report through a [`MetricsSink`].
//! Every hook is infallible and defaults to a no-op, so a sink only overrides
//! what it cares about. A slow or broken sink must never affect a session.

use chat_common::METRICS_TARGET;
use chat_core::RoomId;
use std::fmt;
use std::time::Duration;

use crate::breaker::CircuitState;
use crate::classify::{ErrorRateSignal, RateLevel};
use crate::error_log::ErrorRecord;
use crate::retry::RetryReport;

/// Receiver for connection and resilience metrics
pub trait MetricsSink: Send + Sync + fmt::Debug {
    /// A connect attempt reached the subscribed state
    fn connection_succeeded(
        &self,
        _room_id: RoomId,
        _elapsed: Duration,
        _reconnect_attempts: u32,
    ) {
    }

    /// A session escalated to a connection failure
    fn connection_failed(
        &self,
        _room_id: RoomId,
        _reconnect_attempts: u32,
        _consecutive_errors: u32,
    ) {
    }

    /// A reconnect was scheduled
    fn reconnect_scheduled(&self, _room_id: RoomId, _attempt: u32, _delay: Duration) {}

    fn error_recorded(&self, _record: &ErrorRecord) {}

    /// A retry loop finished
    fn retry_completed(&self, _report: &RetryReport) {}

    fn breaker_transitioned(&self, _name: &str, _from: CircuitState, _to: CircuitState) {}

    fn error_rate_exceeded(&self, _signal: &ErrorRateSignal) {}
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {}

/// Emits every metric as a tracing event on the metrics target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn connection_succeeded(&self, room_id: RoomId, elapsed: Duration, reconnect_attempts: u32) {
        tracing::info!(
            target: METRICS_TARGET,
            metric = "connection.success",
            room_id = %room_id,
            elapsed_ms = elapsed.as_millis() as u64,
            reconnect_attempts,
        );
    }

    fn connection_failed(&self, room_id: RoomId, reconnect_attempts: u32, consecutive_errors: u32) {
        tracing::warn!(
            target: METRICS_TARGET,
            metric = "connection.failure",
            room_id = %room_id,
            reconnect_attempts,
            consecutive_errors,
        );
    }

    fn reconnect_scheduled(&self, room_id: RoomId, attempt: u32, delay: Duration) {
        tracing::info!(
            target: METRICS_TARGET,
            metric = "connection.reconnect",
            room_id = %room_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
        );
    }

    fn error_recorded(&self, record: &ErrorRecord) {
        tracing::debug!(
            target: METRICS_TARGET,
            metric = "error.recorded",
            category = %record.category,
            severity = %record.severity,
            operation = record.operation.as_deref().unwrap_or("-"),
        );
    }

    fn retry_completed(&self, report: &RetryReport) {
        tracing::info!(
            target: METRICS_TARGET,
            metric = "retry.completed",
            operation = %report.operation,
            outcome = report.outcome.as_str(),
            attempts = report.attempts,
            failures = report.failures,
            elapsed_ms = report.elapsed.as_millis() as u64,
        );
    }

    fn breaker_transitioned(&self, name: &str, from: CircuitState, to: CircuitState) {
        tracing::warn!(
            target: METRICS_TARGET,
            metric = "breaker.transition",
            breaker = name,
            from = from.as_str(),
            to = to.as_str(),
        );
    }

    fn error_rate_exceeded(&self, signal: &ErrorRateSignal) {
        match signal.level {
            RateLevel::Critical => tracing::error!(
                target: METRICS_TARGET,
                metric = "error.rate",
                category = %signal.category,
                per_minute = signal.per_minute,
                critical_per_minute = signal.critical_per_minute,
                "error rate critical",
            ),
            RateLevel::Warning => tracing::warn!(
                target: METRICS_TARGET,
                metric = "error.rate",
                category = %signal.category,
                per_minute = signal.per_minute,
                target_per_minute = signal.target_per_minute,
                "error rate above target",
            ),
        }
    }
}
