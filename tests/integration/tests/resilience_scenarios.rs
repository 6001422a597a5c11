//! Resilience layer tests through the public registry
//!
//! Covers classification of real transport errors, retry loops sharing one
//! registry, per-room breaker isolation and the error-rate monitor.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chat_common::{RateThreshold, ResilienceSettings};
use chat_core::{ErrorCategory, RecoveryAction, RoomId, RoomIdentity, Severity, StreamerId};
use chat_realtime::{SessionConfig, SessionDeps, SessionManager, TransportError};
use chat_resilience::{
    check_error_rates, spawn_error_rate_monitor, CircuitState, Classify, ErrorContext,
    ErrorSignal, RateLevel, RetryError, RetryExecutor, RetryOptions, RetryOutcome,
};
use integration_tests::{
    anonymous, registry, registry_with, FakeAuth, RecordingSink, ScriptedConnector,
};

fn refused() -> TransportError {
    io::Error::new(io::ErrorKind::ConnectionRefused, "connect ECONNREFUSED 10.0.0.1:443").into()
}

fn connect_options(room_id: u64) -> RetryOptions {
    RetryOptions::new("websocket.connect")
        .preset("websocket")
        .context(ErrorContext::new().component("websocket").room(RoomId::new(room_id)))
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn test_connection_refused_is_network_with_retry_and_fallback() {
    let registry = registry(RecordingSink::new());
    let signal = refused().signal();
    assert_eq!(signal.code.as_deref(), Some("ECONNREFUSED"));

    let classified = registry
        .classifier()
        .classify(signal, &ErrorContext::new().component("websocket"));

    assert_eq!(classified.category, ErrorCategory::Network);
    assert_eq!(classified.severity, Severity::High);
    assert_eq!(
        classified.recovery_actions(),
        &[RecoveryAction::Retry, RecoveryAction::Fallback]
    );
    assert_eq!(registry.classifier().stats().total(ErrorCategory::Network), 1);
}

#[test]
fn test_classification_does_not_drift_with_history() {
    let registry = registry(RecordingSink::new());
    let context = ErrorContext::new().operation("session.decode");

    let first = registry
        .classifier()
        .classify(ErrorSignal::parse("expected value at line 1"), &context);
    for _ in 0..50 {
        registry.record_error(ErrorSignal::new("websocket closed"), &context, None);
    }
    let again = registry
        .classifier()
        .classify(ErrorSignal::parse("expected value at line 1"), &context);

    assert_eq!(first.category, ErrorCategory::Parsing);
    assert_eq!(again.category, first.category);
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_after_failures() {
    let sink = RecordingSink::new();
    let registry = registry(sink.clone());
    let executor = RetryExecutor::new(registry.clone());
    let calls = AtomicU32::new(0);

    let result = executor
        .run(&connect_options(1), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(refused())
            } else {
                Ok("open")
            }
        })
        .await;

    assert_eq!(result.unwrap(), "open");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let records = registry.error_log().by_operation("websocket.connect");
    assert_eq!(records.len(), 2);
    assert_eq!(
        records.iter().map(|r| r.attempt).collect::<Vec<_>>(),
        [Some(1), Some(2)]
    );
    assert!(records.iter().all(|r| r.category == ErrorCategory::Network));

    let report = &sink.recorded().retries[0];
    assert_eq!(report.outcome, RetryOutcome::Recovered);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.failures, 2);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_runs_after_exhaustion() {
    let executor = RetryExecutor::new(registry(RecordingSink::new()));
    let calls = AtomicU32::new(0);

    let result = executor
        .run_with_fallback(
            &connect_options(1),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<&str, _>(refused())
            },
            || async { Ok("cached") },
        )
        .await;

    assert_eq!(result.unwrap(), "cached");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

// ============================================================================
// Circuit breakers
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_breakers_are_isolated_per_room() {
    let mut settings = ResilienceSettings::default();
    settings.breaker.failure_threshold = 3;
    let sink = RecordingSink::new();
    let executor = RetryExecutor::new(registry_with(settings, sink.clone()));

    let result = executor
        .run_with_circuit_breaker("websocket:room:1", &connect_options(1), || async {
            Err::<(), _>(refused())
        })
        .await;
    assert!(matches!(result, Err(RetryError::Exhausted { .. })));

    let breakers = executor.registry().breakers();
    assert_eq!(
        breakers.get("websocket:room:1").unwrap().state(),
        CircuitState::Open
    );

    // Room 1 is short-circuited without calling the operation
    let calls = AtomicU32::new(0);
    let result = executor
        .run_with_circuit_breaker("websocket:room:1", &connect_options(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TransportError>(())
        })
        .await;
    assert!(result.unwrap_err().is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Room 2 is unaffected
    let result = executor
        .run_with_circuit_breaker("websocket:room:2", &connect_options(2), || async {
            Ok::<_, TransportError>(())
        })
        .await;
    assert!(result.is_ok());
    assert_eq!(
        breakers.get("websocket:room:2").unwrap().state(),
        CircuitState::Closed
    );

    // Recovery: half-open after the timeout, closed after three successes
    tokio::time::advance(Duration::from_secs(31)).await;
    for _ in 0..3 {
        executor
            .run_with_circuit_breaker("websocket:room:1", &connect_options(1), || async {
                Ok::<_, TransportError>(())
            })
            .await
            .unwrap();
    }
    assert_eq!(
        breakers.get("websocket:room:1").unwrap().state(),
        CircuitState::Closed
    );

    let transitions: Vec<_> = sink
        .recorded()
        .transitions
        .into_iter()
        .filter(|(name, _, _)| name == "websocket:room:1")
        .map(|(_, from, to)| (from, to))
        .collect();
    assert_eq!(
        transitions,
        [
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_manager_sessions_get_their_own_breakers() {
    let (connector, _servers) = ScriptedConnector::refusing();
    let sink = RecordingSink::new();
    let deps = SessionDeps::new(registry(sink), connector, FakeAuth::new(), anonymous());
    let manager = SessionManager::new(deps.clone());

    let first = manager.open(room_config(668)).unwrap();
    let second = manager.open(room_config(700)).unwrap();
    first.connect().await.unwrap();
    second.connect().await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    let mut names: Vec<_> = deps
        .registry
        .breakers()
        .snapshot()
        .into_iter()
        .map(|s| s.name)
        .collect();
    names.sort();
    assert_eq!(names, ["websocket:room:668", "websocket:room:700"]);

    manager.close_all().await;
    assert!(manager.is_empty());
    assert!(first.is_finished() && second.is_finished());
}

fn room_config(room_id: u64) -> SessionConfig {
    SessionConfig::new(
        "ws://scripted.test",
        RoomIdentity::new(RoomId::new(room_id), StreamerId::new(room_id + 1)),
    )
}

// ============================================================================
// Error-rate monitor
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_error_rate_monitor_reports_crossings() {
    let mut settings = ResilienceSettings::default();
    settings.error_rates.window_ms = 60_000;
    settings.error_rates.check_interval_ms = 10_000;
    settings
        .error_rates
        .thresholds
        .insert("network".to_string(), RateThreshold::new(3.0, 6.0));
    let sink = RecordingSink::new();
    let registry = registry_with(settings, sink.clone());
    let context = ErrorContext::new().operation("session.transport_error");

    for _ in 0..4 {
        registry.record_error(refused().signal(), &context, None);
    }
    let signals = check_error_rates(&registry);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].category, ErrorCategory::Network);
    assert_eq!(signals[0].level, RateLevel::Warning);

    for _ in 0..4 {
        registry.record_error(refused().signal(), &context, None);
    }
    let monitor = spawn_error_rate_monitor(registry.clone(), Duration::from_secs(10));
    tokio::time::sleep(Duration::from_secs(11)).await;

    let reported = sink.recorded().rate_signals;
    assert!(reported.len() >= 2);
    assert_eq!(reported.last().unwrap().level, RateLevel::Critical);

    // Once the window slides past the errors nothing is reported
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(check_error_rates(&registry).is_empty());
    monitor.abort();
}
