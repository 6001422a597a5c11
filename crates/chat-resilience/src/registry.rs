//! Shared resilience state
//!
//! Built once from [`ResilienceSettings`] and handed to every session as an
//! `Arc`. Owns the breaker registry, the classifier and its statistics, the
//! error log and the metrics sink.

use chat_common::config::ResilienceSettings;
use chat_core::DomainError;
use std::sync::Arc;

use crate::backoff::BackoffPresets;
use crate::breaker::{BreakerRegistry, CircuitBreakerConfig};
use crate::classify::{ClassifiedError, ErrorClassifier, ErrorContext, ErrorSignal, ErrorStats};
use crate::error_log::{ErrorLog, ErrorRecord};
use crate::metrics::{MetricsSink, NoopMetricsSink};

#[derive(Debug)]
pub struct ResilienceRegistry {
    settings: ResilienceSettings,
    presets: BackoffPresets,
    breakers: BreakerRegistry,
    classifier: ErrorClassifier,
    error_log: ErrorLog,
    sink: Arc<dyn MetricsSink>,
}

impl ResilienceRegistry {
    pub fn new(
        settings: ResilienceSettings,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self, DomainError> {
        let presets = BackoffPresets::from_settings(&settings)?;
        let breakers =
            BreakerRegistry::new(CircuitBreakerConfig::from(&settings.breaker), sink.clone());
        let stats = Arc::new(ErrorStats::new(settings.error_rates.window()));

        Ok(Self {
            presets,
            breakers,
            classifier: ErrorClassifier::new(stats),
            error_log: ErrorLog::new(settings.error_log.capacity),
            settings,
            sink,
        })
    }

    /// Built-in settings with metrics discarded
    pub fn with_defaults() -> Result<Self, DomainError> {
        Self::new(ResilienceSettings::default(), Arc::new(NoopMetricsSink))
    }

    pub fn settings(&self) -> &ResilienceSettings {
        &self.settings
    }

    pub fn presets(&self) -> &BackoffPresets {
        &self.presets
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    /// Classify a failure, append it to the error log and report it
    pub fn record_error(
        &self,
        signal: ErrorSignal,
        context: &ErrorContext,
        attempt: Option<u32>,
    ) -> (ClassifiedError, ErrorRecord) {
        let classified = self.classifier.classify(signal, context);
        let record = self.error_log.push(&classified, context, attempt);
        self.sink.error_recorded(&record);
        (classified, record)
    }
}
