//! Per-category error counters and windowed rates

use chat_common::config::ErrorRateSettings;
use chat_core::ErrorCategory;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound on retained timestamps
const MAX_EVENTS: usize = 10_000;

/// How far over target a category is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLevel {
    Warning,
    Critical,
}

/// A category whose recent error rate crossed its threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRateSignal {
    pub category: ErrorCategory,
    pub level: RateLevel,
    pub per_minute: f64,
    pub target_per_minute: f64,
    pub critical_per_minute: f64,
}

/// Append-only error statistics
#[derive(Debug)]
pub struct ErrorStats {
    totals: [AtomicU64; ErrorCategory::ALL.len()],
    recent: Mutex<VecDeque<(Instant, ErrorCategory)>>,
    window: Duration,
}

fn slot(category: ErrorCategory) -> usize {
    ErrorCategory::ALL
        .iter()
        .position(|c| *c == category)
        .unwrap_or_default()
}

impl ErrorStats {
    pub fn new(window: Duration) -> Self {
        Self {
            totals: Default::default(),
            recent: Mutex::new(VecDeque::new()),
            window,
        }
    }

    pub fn record(&self, category: ErrorCategory) {
        self.totals[slot(category)].fetch_add(1, Ordering::Relaxed);

        let mut recent = self.recent.lock();
        if recent.len() == MAX_EVENTS {
            recent.pop_front();
        }
        recent.push_back((Instant::now(), category));
    }

    /// Lifetime count for a category
    pub fn total(&self, category: ErrorCategory) -> u64 {
        self.totals[slot(category)].load(Ordering::Relaxed)
    }

    /// Lifetime counts for every category that has seen an error
    pub fn totals(&self) -> BTreeMap<ErrorCategory, u64> {
        ErrorCategory::ALL
            .into_iter()
            .map(|c| (c, self.total(c)))
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    /// Errors per minute over the window ending at `now`
    pub fn rates(&self, now: Instant) -> BTreeMap<ErrorCategory, f64> {
        let mut recent = self.recent.lock();
        while recent
            .front()
            .is_some_and(|(at, _)| now.saturating_duration_since(*at) > self.window)
        {
            recent.pop_front();
        }

        let minutes = (self.window.as_secs_f64() / 60.0).max(f64::MIN_POSITIVE);
        let mut counts: BTreeMap<ErrorCategory, f64> = BTreeMap::new();
        for (_, category) in recent.iter() {
            *counts.entry(*category).or_default() += 1.0;
        }
        counts.values_mut().for_each(|n| *n /= minutes);
        counts
    }

    /// Categories whose rate is at or above their target
    pub fn check(&self, settings: &ErrorRateSettings, now: Instant) -> Vec<ErrorRateSignal> {
        self.rates(now)
            .into_iter()
            .filter_map(|(category, per_minute)| {
                let threshold = settings.threshold(category)?;
                let level = if per_minute >= threshold.critical_per_minute {
                    RateLevel::Critical
                } else if per_minute >= threshold.target_per_minute {
                    RateLevel::Warning
                } else {
                    return None;
                };
                Some(ErrorRateSignal {
                    category,
                    level,
                    per_minute,
                    target_per_minute: threshold.target_per_minute,
                    critical_per_minute: threshold.critical_per_minute,
                })
            })
            .collect()
    }
}
