//! Keyed store of the current slab per path.
//!
//! The repository maps each path to its current version. Publishing a new
//! version replaces the map entry atomically; readers still holding the old
//! slab keep reading it to completion, since slabs are shared by `Arc` and
//! only freed when the last holder drops.
//!
//! Lookup, create, and delete never block beyond a map-shard critical
//! section. Idle entries are removed by [`sweep_expired`], driven by the
//! background sweeper in [`super::expiry`].
//!
//! [`sweep_expired`]: Repository::sweep_expired

use super::metrics::{MetricsSnapshot, StorageMetrics};
use super::policy::ExpirationPolicy;
use super::slab::Slab;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Bookkeeping for one stored version.
#[derive(Debug)]
pub struct StoredEntry {
    slab: Arc<Slab>,
    expiration_threshold: Duration,
    last_access: Mutex<Instant>,
    access_count: AtomicU64,
}

impl StoredEntry {
    fn new(slab: Arc<Slab>, expiration_threshold: Duration) -> Self {
        Self {
            slab,
            expiration_threshold,
            last_access: Mutex::new(Instant::now()),
            access_count: AtomicU64::new(0),
        }
    }

    /// Refresh the idle clock and count the access.
    fn touch(&self) {
        *self.last_access.lock().unwrap() = Instant::now();
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    fn expires_at(&self) -> Instant {
        *self.last_access.lock().unwrap() + self.expiration_threshold
    }
}

/// Diagnostics row for one stored entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySnapshot {
    pub path: String,
    pub content_type: String,
    pub len: u64,
    pub complete: bool,
    pub failed: bool,
    pub access_count: u64,
    pub expires_in_secs: u64,
}

/// Concurrent map from path to the current slab version.
#[derive(Debug)]
pub struct Repository {
    entries: DashMap<String, Arc<StoredEntry>>,
    policy: ExpirationPolicy,
    metrics: Arc<StorageMetrics>,
}

impl Repository {
    pub fn new(policy: ExpirationPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
            metrics: Arc::new(StorageMetrics::default()),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Publish a fresh slab as the current version for `path`.
    ///
    /// Any previous version is detached from the map in the same step; its
    /// in-flight readers keep their reference and finish against its bytes.
    /// The expiration threshold is chosen now and frozen into the entry.
    pub fn create(&self, path: &str, content_type: &str) -> Arc<Slab> {
        let threshold = self.policy.threshold_for(path);
        let slab = Arc::new(Slab::new(path, content_type, self.metrics.clone()));
        let entry = Arc::new(StoredEntry::new(slab.clone(), threshold));

        let previous = self.entries.insert(path.to_string(), entry);
        self.metrics.record_created();
        if previous.is_some() {
            self.metrics.record_overwritten();
            debug!(path, "replaced existing version");
        } else {
            debug!(path, content_type, threshold_secs = threshold.as_secs(), "stored new path");
        }
        slab
    }

    /// Fetch the current version, refreshing its idle clock.
    ///
    /// The returned slab stays readable even if the entry is evicted or
    /// replaced afterwards.
    pub fn lookup(&self, path: &str) -> Option<Arc<Slab>> {
        match self.entries.get(path) {
            Some(entry) => {
                entry.touch();
                self.metrics.record_lookup_hit();
                Some(entry.slab.clone())
            }
            None => {
                self.metrics.record_lookup_miss();
                None
            }
        }
    }

    /// Remove the current entry for `path`, if any.
    ///
    /// Returns whether an entry was present. Detached slabs remain usable by
    /// their readers. Repeated deletes are no-ops.
    pub fn delete(&self, path: &str) -> bool {
        let removed = self.entries.remove(path).is_some();
        if removed {
            self.metrics.record_deleted();
            debug!(path, "deleted");
        }
        removed
    }

    /// Ordered listing of all current entries, for diagnostics.
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        let now = Instant::now();
        let mut rows: Vec<EntrySnapshot> = self
            .entries
            .iter()
            .map(|entry| {
                let slab = &entry.value().slab;
                EntrySnapshot {
                    path: entry.key().clone(),
                    content_type: slab.content_type().to_string(),
                    len: slab.len() as u64,
                    complete: slab.is_complete(),
                    failed: slab.is_failed(),
                    access_count: entry.value().access_count.load(Ordering::Relaxed),
                    expires_in_secs: entry
                        .value()
                        .expires_at()
                        .saturating_duration_since(now)
                        .as_secs(),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.path.cmp(&b.path));
        rows
    }

    /// Evict every entry whose idle deadline has passed.
    ///
    /// Each eviction is a compare-and-remove against the exact entry that
    /// was observed expired, with the deadline rechecked at removal, so a
    /// concurrent `create` or `lookup` is never clobbered. Returns the
    /// number of entries evicted.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let candidates: Vec<(String, Arc<StoredEntry>)> = self
            .entries
            .iter()
            .filter(|entry| entry.value().expires_at() < now)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut evicted = 0;
        for (path, candidate) in candidates {
            let removed = self.entries.remove_if(&path, |_, current| {
                Arc::ptr_eq(current, &candidate) && current.expires_at() < now
            });
            if removed.is_some() {
                evicted += 1;
                self.metrics.record_expired();
                debug!(path, "expired idle entry");
            }
        }
        evicted
    }
}
