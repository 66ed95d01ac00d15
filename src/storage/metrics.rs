//! Counters for storage-level events.
//!
//! Every upload terminal transition and every repository mutation is counted
//! here, so nothing fails or disappears without leaving a trace. The
//! diagnostics endpoint serves a [`MetricsSnapshot`].

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic event counters shared by the repository and its slabs.
#[derive(Debug, Default)]
pub struct StorageMetrics {
    created: AtomicU64,
    overwritten: AtomicU64,
    deleted: AtomicU64,
    expired: AtomicU64,
    lookup_hits: AtomicU64,
    lookup_misses: AtomicU64,
    uploads_completed: AtomicU64,
    uploads_failed: AtomicU64,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub created: u64,
    pub overwritten: u64,
    pub deleted: u64,
    pub expired: u64,
    pub lookup_hits: u64,
    pub lookup_misses: u64,
    pub uploads_completed: u64,
    pub uploads_failed: u64,
}

impl StorageMetrics {
    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overwritten(&self) {
        self.overwritten.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deleted(&self) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup_hit(&self) {
        self.lookup_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup_miss(&self) {
        self.lookup_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload_completed(&self) {
        self.uploads_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload_failed(&self) {
        self.uploads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            lookup_hits: self.lookup_hits.load(Ordering::Relaxed),
            lookup_misses: self.lookup_misses.load(Ordering::Relaxed),
            uploads_completed: self.uploads_completed.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = StorageMetrics::default();
        metrics.record_created();
        metrics.record_created();
        metrics.record_expired();
        metrics.record_upload_failed();

        let snap = metrics.snapshot();
        assert_eq!(snap.created, 2);
        assert_eq!(snap.expired, 1);
        assert_eq!(snap.uploads_failed, 1);
        assert_eq!(snap.deleted, 0);
    }
}
