//! Periodic error-rate check
//!
//! Compares each category's recent rate against its configured target and
//! critical thresholds and reports crossings to the metrics sink. Sessions are
//! never interrupted by it.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::classify::ErrorRateSignal;
use crate::registry::ResilienceRegistry;

/// Run one check now
pub fn check_error_rates(registry: &ResilienceRegistry) -> Vec<ErrorRateSignal> {
    let signals = registry
        .classifier()
        .stats()
        .check(&registry.settings().error_rates, Instant::now());
    for signal in &signals {
        registry.sink().error_rate_exceeded(signal);
    }
    signals
}

/// Check error rates every `period` until the handle is aborted
pub fn spawn_error_rate_monitor(
    registry: Arc<ResilienceRegistry>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let signals = check_error_rates(&registry);
            if !signals.is_empty() {
                tracing::debug!(count = signals.len(), "error rate thresholds crossed");
            }
        }
    })
}
