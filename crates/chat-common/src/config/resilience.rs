//! Resilience settings
//!
//! Backoff presets, circuit breaker thresholds and error-rate targets are data,
//! not code. Built-in defaults can be overridden by an optional file (any
//! format the `config` crate understands) and by `RESILIENCE__*` environment
//! variables, e.g. `RESILIENCE__BREAKER__FAILURE_THRESHOLD=3`.

use chat_core::ErrorCategory;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Name of the preset used when a requested preset does not exist
pub const DEFAULT_PRESET: &str = "default";

/// All resilience tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub presets: BTreeMap<String, PresetSettings>,
    pub breaker: BreakerSettings,
    pub error_log: ErrorLogSettings,
    pub error_rates: ErrorRateSettings,
}

/// One named backoff preset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresetSettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
    pub max_attempts: u32,
}

impl PresetSettings {
    #[must_use]
    pub const fn new(
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
        jitter: bool,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay_ms,
            max_delay_ms,
            multiplier,
            jitter,
            max_attempts,
        }
    }

    fn validate(&self, name: &str) -> Result<(), SettingsError> {
        let invalid = |reason: String| SettingsError::InvalidPreset {
            name: name.to_string(),
            reason,
        };

        if self.initial_delay_ms == 0 {
            return Err(invalid("initial_delay_ms must be positive".to_string()));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(invalid(format!(
                "max_delay_ms ({}) must be >= initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(invalid(format!("multiplier must be >= 1, got {}", self.multiplier)));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub monitoring_window_ms: u64,
    /// Upper bound on retained history entries
    pub max_history: usize,
}

impl BreakerSettings {
    #[must_use]
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    #[must_use]
    pub fn monitoring_window(&self) -> Duration {
        Duration::from_millis(self.monitoring_window_ms)
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            monitoring_window_ms: 60_000,
            max_history: 1000,
        }
    }
}

/// Error record ring buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorLogSettings {
    pub capacity: usize,
}

impl Default for ErrorLogSettings {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Errors-per-minute targets for one category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateThreshold {
    pub target_per_minute: f64,
    pub critical_per_minute: f64,
}

impl RateThreshold {
    #[must_use]
    pub const fn new(target_per_minute: f64, critical_per_minute: f64) -> Self {
        Self {
            target_per_minute,
            critical_per_minute,
        }
    }
}

/// Aggregate error-rate monitoring
///
/// Keys are lowercase category names (`network`, `transport`, ...). Categories
/// without an entry are never reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorRateSettings {
    pub window_ms: u64,
    pub check_interval_ms: u64,
    pub thresholds: BTreeMap<String, RateThreshold>,
}

impl ErrorRateSettings {
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Threshold configured for a category
    #[must_use]
    pub fn threshold(&self, category: ErrorCategory) -> Option<RateThreshold> {
        self.thresholds
            .get(&category.as_str().to_lowercase())
            .copied()
    }
}

impl Default for ErrorRateSettings {
    fn default() -> Self {
        let thresholds = [
            (ErrorCategory::Network, RateThreshold::new(5.0, 20.0)),
            (ErrorCategory::Transport, RateThreshold::new(5.0, 20.0)),
            (ErrorCategory::Api, RateThreshold::new(10.0, 30.0)),
            (ErrorCategory::Auth, RateThreshold::new(1.0, 5.0)),
            (ErrorCategory::Parsing, RateThreshold::new(10.0, 50.0)),
            (ErrorCategory::Integration, RateThreshold::new(5.0, 20.0)),
            (ErrorCategory::Render, RateThreshold::new(10.0, 50.0)),
            (ErrorCategory::Storage, RateThreshold::new(2.0, 10.0)),
        ]
        .into_iter()
        .map(|(category, threshold)| (category.as_str().to_lowercase(), threshold))
        .collect();

        Self {
            window_ms: 300_000,
            check_interval_ms: 30_000,
            thresholds,
        }
    }
}

fn default_presets() -> BTreeMap<String, PresetSettings> {
    [
        ("network", PresetSettings::new(1000, 30_000, 2.0, true, 5)),
        ("api", PresetSettings::new(500, 10_000, 2.0, true, 3)),
        ("websocket", PresetSettings::new(1000, 30_000, 1.5, true, 3)),
        ("storage", PresetSettings::new(100, 2000, 2.0, false, 3)),
        (DEFAULT_PRESET, PresetSettings::new(1000, 10_000, 2.0, true, 3)),
    ]
    .into_iter()
    .map(|(name, preset)| (name.to_string(), preset))
    .collect()
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            presets: default_presets(),
            breaker: BreakerSettings::default(),
            error_log: ErrorLogSettings::default(),
            error_rates: ErrorRateSettings::default(),
        }
    }
}

impl ResilienceSettings {
    /// Load settings: built-in defaults, then the optional file, then environment
    ///
    /// Presets named in the file replace the built-in preset of the same name;
    /// built-in presets not mentioned are kept.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("RESILIENCE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Self = builder.build()?.try_deserialize()?;
        for (name, preset) in default_presets() {
            settings.presets.entry(name).or_insert(preset);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Validate every preset and threshold
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.presets.contains_key(DEFAULT_PRESET) {
            return Err(SettingsError::MissingPreset(DEFAULT_PRESET.to_string()));
        }
        for (name, preset) in &self.presets {
            preset.validate(name)?;
        }

        if self.breaker.failure_threshold == 0 {
            return Err(SettingsError::Invalid(
                "breaker.failure_threshold must be >= 1".to_string(),
            ));
        }
        if self.breaker.recovery_timeout_ms == 0 || self.breaker.monitoring_window_ms == 0 {
            return Err(SettingsError::Invalid(
                "breaker timeouts must be positive".to_string(),
            ));
        }
        if self.breaker.max_history == 0 {
            return Err(SettingsError::Invalid(
                "breaker.max_history must be >= 1".to_string(),
            ));
        }
        if self.error_log.capacity == 0 {
            return Err(SettingsError::Invalid(
                "error_log.capacity must be >= 1".to_string(),
            ));
        }
        if self.error_rates.window_ms == 0 || self.error_rates.check_interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "error_rates window and interval must be positive".to_string(),
            ));
        }
        for (name, threshold) in &self.error_rates.thresholds {
            if threshold.target_per_minute < 0.0
                || threshold.critical_per_minute < threshold.target_per_minute
            {
                return Err(SettingsError::Invalid(format!(
                    "error_rates.thresholds.{name}: critical must be >= target >= 0"
                )));
            }
        }
        Ok(())
    }

    /// Look up a preset by name, falling back to the default preset
    #[must_use]
    pub fn preset(&self, name: &str) -> Option<&PresetSettings> {
        self.presets
            .get(name)
            .or_else(|| self.presets.get(DEFAULT_PRESET))
    }
}

/// Settings loading errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Invalid preset '{name}': {reason}")]
    InvalidPreset { name: String, reason: String },

    #[error("Missing required preset: {0}")]
    MissingPreset(String),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}
