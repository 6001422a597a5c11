//! Bounded log of recent classified errors

use chat_core::{ActorId, ErrorCategory, RoomId, Severity};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::classify::{ClassifiedError, ErrorContext};

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<ActorId>,
    /// Attempt number inside a retry loop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    pub recovery_attempted: bool,
}

impl ErrorRecord {
    fn new(id: u64, error: &ClassifiedError, context: &ErrorContext, attempt: Option<u32>) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            category: error.category,
            severity: error.severity,
            message: error.signal.message.clone(),
            code: error.signal.code.clone(),
            status: error.signal.status,
            operation: context.operation.clone(),
            component: context.component.clone(),
            room_id: context.room_id,
            actor_id: context.actor_id,
            attempt,
            recovery_attempted: false,
        }
    }
}

/// Ring buffer of the most recent error records
#[derive(Debug)]
pub struct ErrorLog {
    capacity: usize,
    records: Mutex<VecDeque<ErrorRecord>>,
    next_id: AtomicU64,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a record, evicting the oldest when full
    pub fn push(
        &self,
        error: &ClassifiedError,
        context: &ErrorContext,
        attempt: Option<u32>,
    ) -> ErrorRecord {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = ErrorRecord::new(id, error, context, attempt);

        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        record
    }

    /// Flag a record once a retry or reconnect was scheduled for it
    ///
    /// Returns false if the record was already evicted.
    pub fn mark_recovery_attempted(&self, id: u64) -> bool {
        let mut records = self.records.lock();
        match records.iter_mut().rev().find(|r| r.id == id) {
            Some(record) => {
                record.recovery_attempted = true;
                true
            }
            None => false,
        }
    }

    /// Up to `n` most recent records, newest last
    pub fn recent(&self, n: usize) -> Vec<ErrorRecord> {
        let records = self.records.lock();
        let skip = records.len().saturating_sub(n);
        records.iter().skip(skip).cloned().collect()
    }

    pub fn by_category(&self, category: ErrorCategory) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.category == category)
            .cloned()
            .collect()
    }

    pub fn by_operation(&self, operation: &str) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.operation.as_deref() == Some(operation))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}
