//! # Local Queue Store
//!
//! Durable keyed storage of attendance records tagged with a sync status.
//! The whole queue is kept in memory and mirrored as one JSON document under
//! [`QUEUE_KEY`] in the platform [`KeyValueStorage`].
//!
//! ## Features
//!
//! - **Idempotent enqueue**: a second enqueue of the same id is a no-op
//! - **Defensive copies**: `list` hands out clones, never references
//! - **Degraded durability**: when the storage refuses a write the queue
//!   keeps working from memory and reports it through `is_degraded()`
//! - **No blind overwrites**: when the persisted queue could not be read at
//!   load, nothing is written until a later read succeeds; what was read is
//!   then merged with the in-memory records
//! - **Load purge**: terminal records left behind by a crash are dropped and
//!   invalid ids are repaired
//!
//! ## Usage
//!
//! ```rust,no_run
//! use attendsync::local_db::MemoryStorage;
//! use attendsync::offline::queue::LocalQueueStore;
//! use std::sync::Arc;
//!
//! # async fn example(record: attendsync::shared::record::AttendanceRecord) {
//! let queue = LocalQueueStore::load(Arc::new(MemoryStorage::new())).await;
//! queue.enqueue(record).await;
//! assert_eq!(queue.count_pending().await, 1);
//! # }
//! ```

use crate::local_db::KeyValueStorage;
use crate::shared::record::{AttendanceRecord, StatusTransitionError, SyncStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage key holding the serialized queue
pub const QUEUE_KEY: &str = "attendance_queue";

/// Queue mutation failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("record {0} is not queued")]
    NotFound(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] StatusTransitionError),
}

/// Local queue of attendance records
pub struct LocalQueueStore {
    storage: Arc<dyn KeyValueStorage>,
    /// Insertion-ordered records
    records: RwLock<Vec<AttendanceRecord>>,
    degraded: AtomicBool,
    /// Persisted contents are unknown; set when the load-time read failed
    unread: AtomicBool,
}

impl std::fmt::Debug for LocalQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalQueueStore")
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}

impl LocalQueueStore {
    /// Loads the persisted queue, dropping records already in a terminal state
    pub async fn load(storage: Arc<dyn KeyValueStorage>) -> Self {
        let store = Self {
            storage,
            records: RwLock::new(Vec::new()),
            degraded: AtomicBool::new(false),
            unread: AtomicBool::new(false),
        };

        let raw = match store.storage.get(QUEUE_KEY).await {
            Ok(raw) => raw,
            Err(e) => {
                store.unread.store(true, Ordering::SeqCst);
                store.enter_degraded(&e.to_string());
                return store;
            }
        };

        let Some(raw) = raw else {
            return store;
        };

        let (records, cleaned) = decode(&raw);
        tracing::info!(pending = records.len(), "Loaded local queue");
        {
            let mut guard = store.records.write().await;
            *guard = records;
            if cleaned {
                store.persist(&mut guard).await;
            }
        }

        store
    }

    /// Retries reading the persisted queue after an unreadable load
    ///
    /// Records found are merged into memory and the merged queue is written
    /// back. No-op once the persisted queue has been read.
    pub async fn refresh(&self) {
        if !self.unread.load(Ordering::SeqCst) {
            return;
        }
        let mut records = self.records.write().await;
        self.persist(&mut records).await;
    }

    /// Persists `record` as Pending
    ///
    /// Returns `false` when a record with the same id is already queued or
    /// the record is not Pending.
    pub async fn enqueue(&self, record: AttendanceRecord) -> bool {
        if !record.is_pending() {
            tracing::warn!(record_id = %record.id, status = %record.sync_status(), "Refusing to enqueue non-pending record");
            return false;
        }

        let mut records = self.records.write().await;
        if records.iter().any(|queued| queued.id == record.id) {
            tracing::debug!(record_id = %record.id, "Record already queued");
            return false;
        }

        tracing::debug!(record_id = %record.id, "Enqueued attendance record");
        records.push(record);
        self.persist(&mut records).await;
        true
    }

    /// Copies of queued records, optionally filtered by status
    pub async fn list(&self, status: Option<SyncStatus>) -> Vec<AttendanceRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .filter(|record| status.map_or(true, |status| record.sync_status() == status))
            .cloned()
            .collect()
    }

    /// Copy of one queued record
    pub async fn get(&self, id: Uuid) -> Option<AttendanceRecord> {
        let records = self.records.read().await;
        records.iter().find(|record| record.id == id).cloned()
    }

    /// Moves a queued record to `status`
    pub async fn update_status(&self, id: Uuid, status: SyncStatus) -> Result<(), QueueError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(QueueError::NotFound(id))?;
        record.transition_to(status)?;
        self.persist(&mut records).await;
        Ok(())
    }

    /// Removes a record, returning it when it was queued
    pub async fn remove(&self, id: Uuid) -> Option<AttendanceRecord> {
        let mut records = self.records.write().await;
        let position = records.iter().position(|record| record.id == id)?;
        let removed = records.remove(position);
        self.persist(&mut records).await;
        Some(removed)
    }

    /// Count pending records
    pub async fn count_pending(&self) -> usize {
        let records = self.records.read().await;
        records.iter().filter(|record| record.is_pending()).count()
    }

    /// Whether the queue is running from memory only
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    async fn persist(&self, records: &mut Vec<AttendanceRecord>) {
        if self.unread.load(Ordering::SeqCst) {
            match self.storage.get(QUEUE_KEY).await {
                Ok(raw) => {
                    let (persisted, _) = raw.as_deref().map(decode).unwrap_or_default();
                    let recovered = merge_persisted(records, persisted);
                    self.unread.store(false, Ordering::SeqCst);
                    tracing::info!(recovered, "Persisted queue readable again; merged with session records");
                }
                Err(e) => {
                    // never overwrite contents that were not read
                    self.enter_degraded(&e.to_string());
                    return;
                }
            }
        }

        let json = match serde_json::to_string(&*records) {
            Ok(json) => json,
            Err(e) => {
                self.enter_degraded(&e.to_string());
                return;
            }
        };

        match self.storage.set(QUEUE_KEY, &json).await {
            Ok(()) => {
                if self.degraded.swap(false, Ordering::SeqCst) {
                    tracing::info!("Local queue durability restored");
                }
            }
            Err(e) => self.enter_degraded(&e.to_string()),
        }
    }

    fn enter_degraded(&self, reason: &str) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                reason,
                "Local storage unavailable; queue running in degraded durability mode (session only)"
            );
        }
    }
}

/// Parses a persisted queue, dropping terminal records and repairing ids
///
/// The flag is set when the result differs from what was stored.
fn decode(raw: &str) -> (Vec<AttendanceRecord>, bool) {
    let mut records: Vec<AttendanceRecord> = match serde_json::from_str(raw) {
        Ok(records) => records,
        Err(e) => {
            tracing::error!(error = %e, "Discarding unreadable persisted queue");
            return (Vec::new(), false);
        }
    };

    let before = records.len();
    records.retain(|record| !record.sync_status().is_terminal());
    let purged = before - records.len();

    let mut repaired = 0;
    for record in records.iter_mut() {
        let stored = record.id;
        record.ensure_valid_id();
        if record.id != stored {
            repaired += 1;
        }
    }

    if purged > 0 || repaired > 0 {
        tracing::info!(purged, repaired, "Cleaned persisted queue");
    }
    (records, purged > 0 || repaired > 0)
}

/// Puts persisted records ahead of session ones; the session copy wins on
/// a shared id. Returns how many records came only from storage.
fn merge_persisted(records: &mut Vec<AttendanceRecord>, persisted: Vec<AttendanceRecord>) -> usize {
    let mut session = std::mem::take(records);
    let mut recovered = 0;
    for stored in persisted {
        match session.iter().position(|record| record.id == stored.id) {
            Some(position) => records.push(session.remove(position)),
            None => {
                recovered += 1;
                records.push(stored);
            }
        }
    }
    records.extend(session);
    recovered
}
