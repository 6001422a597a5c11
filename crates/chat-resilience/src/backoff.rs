//! Exponential backoff with optional jitter
//!
//! Delays grow as `initial * multiplier^(attempt - 1)`, capped at the preset's
//! maximum. With jitter enabled the result is spread uniformly by ±25% and
//! clamped at zero.

use chat_common::config::{PresetSettings, ResilienceSettings, DEFAULT_PRESET};
use chat_core::DomainError;
use rand::Rng;
use std::collections::BTreeMap;
use std::time::Duration;

/// Fraction of the base delay used as the jitter spread
pub const JITTER_FRACTION: f64 = 0.25;

/// One validated backoff preset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    pub max_attempts: u32,
}

impl BackoffConfig {
    /// Create a validated configuration with a default of 3 attempts
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter: bool,
    ) -> Result<Self, DomainError> {
        let config = Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter,
            max_attempts: 3,
        };
        config.validate("custom")?;
        Ok(config)
    }

    /// Build from a named preset entry
    pub fn from_preset(name: &str, preset: &PresetSettings) -> Result<Self, DomainError> {
        let config = Self {
            initial_delay: Duration::from_millis(preset.initial_delay_ms),
            max_delay: Duration::from_millis(preset.max_delay_ms),
            multiplier: preset.multiplier,
            jitter: preset.jitter,
            max_attempts: preset.max_attempts,
        };
        config.validate(name)?;
        Ok(config)
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    fn validate(&self, name: &str) -> Result<(), DomainError> {
        let invalid = |reason: &str| DomainError::InvalidPreset {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if self.initial_delay.is_zero() {
            return Err(invalid("initial delay must be positive"));
        }
        if self.max_delay < self.initial_delay {
            return Err(invalid("max delay must be >= initial delay"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(invalid("multiplier must be >= 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max attempts must be >= 1"));
        }
        Ok(())
    }

    /// Delay before retry `attempt` without jitter, in milliseconds
    fn base_delay_ms(&self, attempt: u32) -> Result<f64, DomainError> {
        if attempt == 0 {
            return Err(DomainError::invalid_argument("attempt must be >= 1"));
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let initial = self.initial_delay.as_millis() as f64;
        let max = self.max_delay.as_millis() as f64;

        // powi overflows to infinity for large exponents; min() still caps it
        Ok((initial * self.multiplier.powi(exponent)).min(max))
    }

    /// Delay before retry `attempt` (1-based) ignoring the jitter flag
    pub fn base_delay(&self, attempt: u32) -> Result<Duration, DomainError> {
        self.base_delay_ms(attempt).map(millis_to_duration)
    }

    /// Delay before retry `attempt` (1-based), jittered if configured
    pub fn delay(&self, attempt: u32) -> Result<Duration, DomainError> {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    /// Same as [`delay`](Self::delay) with a caller-supplied random source
    pub fn delay_with_rng<R: Rng + ?Sized>(
        &self,
        attempt: u32,
        rng: &mut R,
    ) -> Result<Duration, DomainError> {
        let base = self.base_delay_ms(attempt)?;
        if !self.jitter {
            return Ok(millis_to_duration(base));
        }

        let spread = base * JITTER_FRACTION;
        let offset = rng.gen_range(-spread..=spread);
        Ok(millis_to_duration((base + offset).max(0.0)))
    }
}

fn millis_to_duration(ms: f64) -> Duration {
    Duration::from_millis(ms.round() as u64)
}

/// The named preset table, validated once at load
#[derive(Debug, Clone)]
pub struct BackoffPresets {
    presets: BTreeMap<String, BackoffConfig>,
    default: BackoffConfig,
}

impl BackoffPresets {
    /// Validate every preset in the settings
    pub fn from_settings(settings: &ResilienceSettings) -> Result<Self, DomainError> {
        let presets = settings
            .presets
            .iter()
            .map(|(name, preset)| Ok((name.clone(), BackoffConfig::from_preset(name, preset)?)))
            .collect::<Result<BTreeMap<_, _>, DomainError>>()?;

        let default = *presets
            .get(DEFAULT_PRESET)
            .ok_or_else(|| DomainError::UnknownPreset(DEFAULT_PRESET.to_string()))?;

        Ok(Self { presets, default })
    }

    /// The built-in preset table
    pub fn builtin() -> Result<Self, DomainError> {
        Self::from_settings(&ResilienceSettings::default())
    }

    /// Look up a preset; unknown names resolve to the default preset
    #[must_use]
    pub fn get(&self, name: &str) -> &BackoffConfig {
        self.presets.get(name).unwrap_or(&self.default)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.presets.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    /// Delay for `attempt` under the named preset
    pub fn delay(&self, attempt: u32, preset: &str) -> Result<Duration, DomainError> {
        self.get(preset).delay(attempt)
    }
}
