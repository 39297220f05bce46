//! # Sync Metrics
//!
//! Counters for submission outcomes, periodic passes and the supervised
//! background writes to the index store.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SyncMetrics {
    submissions_synced: AtomicU64,
    submissions_queued: AtomicU64,
    submissions_rejected: AtomicU64,
    passes_completed: AtomicU64,
    passes_skipped: AtomicU64,
    items_synced: AtomicU64,
    items_evicted: AtomicU64,
    mirror_succeeded: AtomicU64,
    mirror_failed: AtomicU64,
}

/// Point-in-time copy of [`SyncMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub submissions_synced: u64,
    pub submissions_queued: u64,
    pub submissions_rejected: u64,
    pub passes_completed: u64,
    pub passes_skipped: u64,
    pub items_synced: u64,
    pub items_evicted: u64,
    pub mirror_succeeded: u64,
    pub mirror_failed: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submission_synced(&self) {
        self.submissions_synced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_queued(&self) {
        self.submissions_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_rejected(&self) {
        self.submissions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pass(&self, synced: usize, evicted: usize) {
        self.passes_completed.fetch_add(1, Ordering::Relaxed);
        self.items_synced.fetch_add(synced as u64, Ordering::Relaxed);
        self.items_evicted.fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub fn record_pass_skipped(&self) {
        self.passes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mirror(&self, succeeded: bool) {
        if succeeded {
            self.mirror_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.mirror_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submissions_synced: self.submissions_synced.load(Ordering::Relaxed),
            submissions_queued: self.submissions_queued.load(Ordering::Relaxed),
            submissions_rejected: self.submissions_rejected.load(Ordering::Relaxed),
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            passes_skipped: self.passes_skipped.load(Ordering::Relaxed),
            items_synced: self.items_synced.load(Ordering::Relaxed),
            items_evicted: self.items_evicted.load(Ordering::Relaxed),
            mirror_succeeded: self.mirror_succeeded.load(Ordering::Relaxed),
            mirror_failed: self.mirror_failed.load(Ordering::Relaxed),
        }
    }

    /// Share of finished mirror writes that succeeded
    pub fn mirror_success_rate(&self) -> f64 {
        let ok = self.mirror_succeeded.load(Ordering::Relaxed);
        let failed = self.mirror_failed.load(Ordering::Relaxed);
        if ok + failed == 0 {
            0.0
        } else {
            ok as f64 / (ok + failed) as f64
        }
    }
}
