//! Engine counters
//!
//! - Counters only
//! - Monotonic increase
//! - Relaxed atomics; exactness across threads is not required

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for one model (and everything it drives)
#[derive(Debug, Default)]
pub struct EngineMetrics {
    queries_executed: AtomicU64,
    fetches_issued: AtomicU64,
    writes_issued: AtomicU64,
    validation_failures: AtomicU64,
    documents_created: AtomicU64,
    documents_removed: AtomicU64,
}

impl EngineMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_queries(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_fetches(&self, count: u64) {
        self.fetches_issued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_writes(&self) {
        self.writes_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_validation_failures(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_created(&self) {
        self.documents_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_removed(&self) {
        self.documents_removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            fetches_issued: self.fetches_issued.load(Ordering::Relaxed),
            writes_issued: self.writes_issued.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            documents_created: self.documents_created.load(Ordering::Relaxed),
            documents_removed: self.documents_removed.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`EngineMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queries_executed: u64,
    pub fetches_issued: u64,
    pub writes_issued: u64,
    pub validation_failures: u64,
    pub documents_created: u64,
    pub documents_removed: u64,
}
