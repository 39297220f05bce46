//! # Sync Service
//!
//! The attendance sync orchestrator. Decides, for every submission, whether
//! to write immediately, queue, reject as a duplicate or drop as invalid,
//! and drains the local queue against the two remote stores.
//!
//! ## Architecture
//!
//! The service coordinates:
//! - **Local Queue Store**: records waiting for a remote write
//! - **Duplicate Detector** and **Concurrency Guard**: dedup on submit
//! - **Ledger / Index stores**: primary write, fallback write and the
//!   supervised best-effort mirror after a ledger success
//! - **Network Monitor**: online checks and offline -> online transitions
//! - **Metrics**: outcome counters
//!
//! ## Write Path
//!
//! ```text
//! ledger ── ok ──────────────► Synced (+ background index mirror)
//!   ├─ timeout/network ──────► Queued
//!   ├─ validation ───────────► Rejected(Validation)
//!   └─ other ─► index ── ok ─► Synced
//!                 ├─ duplicate ► Rejected(DuplicateFound)
//!                 └─ other ────► Queued
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use attendsync::sync::{SubmitOutcome, SyncService};
//! use std::sync::Arc;
//!
//! # async fn example(service: Arc<SyncService>, draft: attendsync::shared::record::AttendanceDraft) {
//! service.start().await.unwrap();
//!
//! match service.submit_draft(draft, false).await {
//!     SubmitOutcome::Synced => println!("saved"),
//!     SubmitOutcome::Queued => println!("saved, will retry"),
//!     SubmitOutcome::Rejected(reason) => println!("not saved: {reason}"),
//! }
//!
//! let report = service.periodic_sync().await;
//! println!("{}/{} synced", report.success_count, report.total_count);
//! # }
//! ```

pub mod backoff;
pub mod metrics;
pub mod network_monitor;

pub use backoff::ItemDelay;
pub use metrics::{MetricsSnapshot, SyncMetrics};
pub use network_monitor::{ConnectivityMonitor, HttpProbe, NetworkMonitor};

use crate::local_db::LocalDatabase;
use crate::offline::{ConcurrencyGuard, DuplicateCandidate, DuplicateCheck, DuplicateDetector, ExistingEntry, LocalQueueStore};
use crate::reference::{ReferenceResolver, ResolvedAttendance};
use crate::remote::{with_timeout, IndexStore, LedgerStore, RemoteError};
use crate::shared::config::SyncConfig;
use crate::shared::error::SyncError;
use crate::shared::record::{AttendanceDraft, AttendanceRecord, SyncStatus};
use crate::shared::row::AttendanceRow;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

/// Result of a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Accepted by a remote store
    Synced,
    /// Saved locally, will retry
    Queued,
    /// Not saved
    Rejected(RejectReason),
}

impl SubmitOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SubmitOutcome::Synced => "synced",
            SubmitOutcome::Queued => "queued",
            SubmitOutcome::Rejected(RejectReason::DuplicateFound(_)) => "rejected_duplicate",
            SubmitOutcome::Rejected(RejectReason::Validation(_)) => "rejected_validation",
        }
    }
}

/// Why a submission was not saved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Same person/community/role already registered that day; resubmit
    /// with `force = true` after operator confirmation
    DuplicateFound(ExistingEntry),
    /// Reference data did not resolve
    Validation(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::DuplicateFound(existing) => {
                write!(f, "already registered on {} at {}", existing.date, existing.time)
            }
            RejectReason::Validation(message) => write!(f, "invalid record: {message}"),
        }
    }
}

/// Summary of one periodic pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Records that reached Synced during the pass
    pub success_count: usize,
    /// Pending records at the start of the pass
    pub total_count: usize,
    /// Records evicted as Error (stale references, invalid, duplicate)
    pub evicted: usize,
    /// Pass stopped early because connectivity dropped
    pub aborted: bool,
    /// Another pass was already running
    pub skipped: bool,
}

/// Polling surface for the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatusSnapshot {
    pub pending: usize,
    pub running: bool,
    pub online: bool,
    /// Queue is running from memory only
    pub degraded: bool,
    pub last_pass_at: Option<DateTime<Utc>>,
    pub last_report: Option<SyncReport>,
    pub metrics: MetricsSnapshot,
}

/// Collaborators injected into [`SyncService`]
#[derive(Clone)]
pub struct SyncComponents {
    pub queue: Arc<LocalQueueStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub index: Arc<dyn IndexStore>,
    pub resolver: ReferenceResolver,
    pub monitor: Arc<dyn ConnectivityMonitor>,
}

/// Remote dispatch classification shared by submit and the drain
#[derive(Debug)]
enum Dispatch {
    Synced,
    Retry(RemoteError),
    Invalid(String),
    Duplicate,
}

/// Clears the running flag when a pass ends, even on cancellation
struct PassFlag<'a>(&'a AtomicBool);

impl Drop for PassFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Main sync service coordinator
pub struct SyncService {
    config: SyncConfig,
    offset: FixedOffset,
    queue: Arc<LocalQueueStore>,
    ledger: Arc<dyn LedgerStore>,
    index: Arc<dyn IndexStore>,
    resolver: ReferenceResolver,
    monitor: Arc<dyn ConnectivityMonitor>,
    detector: DuplicateDetector,
    guard: ConcurrencyGuard,
    metrics: Arc<SyncMetrics>,
    mirror_tasks: Mutex<JoinSet<()>>,
    pass_running: AtomicBool,
    last_pass: RwLock<Option<(DateTime<Utc>, SyncReport)>>,
    metadata: Option<LocalDatabase>,
    background_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl SyncService {
    /// Create a new sync service
    pub fn new(config: SyncConfig, components: SyncComponents) -> Self {
        let offset = config.utc_offset();
        let detector = DuplicateDetector::new(
            Arc::clone(&components.index),
            Arc::clone(&components.queue),
            components.resolver.clone(),
            offset,
            config.remote_timeout(),
        );
        // ledger write plus index fallback
        let guard = ConcurrencyGuard::new(config.guard_window(), config.remote_timeout() * 2);

        Self {
            offset,
            queue: components.queue,
            ledger: components.ledger,
            index: components.index,
            resolver: components.resolver,
            monitor: components.monitor,
            detector,
            guard,
            metrics: Arc::new(SyncMetrics::new()),
            mirror_tasks: Mutex::new(JoinSet::new()),
            pass_running: AtomicBool::new(false),
            last_pass: RwLock::new(None),
            metadata: None,
            background_task: Mutex::new(None),
            config,
        }
    }

    /// Persists pass metadata in `db`
    pub fn with_metadata(mut self, db: LocalDatabase) -> Self {
        self.metadata = Some(db);
        self
    }

    /// Loads the last pass time and report persisted by a previous run
    pub async fn restore_metadata(&self) -> Result<(), SyncError> {
        let Some(db) = &self.metadata else {
            return Ok(());
        };
        let Some(at) = db.get_last_sync_time().await? else {
            return Ok(());
        };
        let report = match db.get_last_sync_report().await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => SyncReport::default(),
        };
        *self.last_pass.write().await = Some((at, report));
        Ok(())
    }

    pub fn queue(&self) -> &Arc<LocalQueueStore> {
        &self.queue
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    /// Builds a record from a raw draft and submits it
    pub async fn submit_draft(&self, draft: AttendanceDraft, force: bool) -> SubmitOutcome {
        self.submit(AttendanceRecord::from_draft(draft), force).await
    }

    /// Submits one attendance record
    ///
    /// `force` skips the duplicate detector and the concurrency guard; pass
    /// it only after the operator confirmed a `DuplicateFound` prompt.
    pub async fn submit(&self, mut record: AttendanceRecord, force: bool) -> SubmitOutcome {
        record.ensure_valid_id();
        if force {
            record.force_inserted = true;
        }

        let outcome = self.submit_inner(record.clone(), force).await;

        match &outcome {
            SubmitOutcome::Synced => self.metrics.record_submission_synced(),
            SubmitOutcome::Queued => self.metrics.record_submission_queued(),
            SubmitOutcome::Rejected(_) => self.metrics.record_submission_rejected(),
        }
        tracing::info!(record_id = %record.id, outcome = outcome.label(), force, "Attendance submission finished");
        outcome
    }

    async fn submit_inner(&self, record: AttendanceRecord, force: bool) -> SubmitOutcome {
        if !record.is_pending() {
            return SubmitOutcome::Rejected(RejectReason::Validation(format!(
                "record is already {}",
                record.sync_status()
            )));
        }

        let resolved = match self.resolver.resolve(&record).await {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(record_id = %record.id, error = %e, "Dropping attendance with unresolved reference data");
                return SubmitOutcome::Rejected(RejectReason::Validation(e.to_string()));
            }
        };

        let candidate = DuplicateCandidate::new(&record, &resolved, self.offset);
        let online = self.monitor.is_online();

        if !force {
            if let DuplicateCheck::DuplicateFound(existing) = self.detector.check(&candidate, online).await {
                return SubmitOutcome::Rejected(RejectReason::DuplicateFound(existing));
            }
            if let Err(held_for) = self.guard.try_acquire(&candidate.key, record.id, record.timestamp).await {
                return SubmitOutcome::Rejected(RejectReason::DuplicateFound(ExistingEntry::at(
                    held_for,
                    self.offset,
                )));
            }
        }

        let record_id = record.id;
        // connectivity may have changed during the duplicate lookup
        let outcome = if !self.monitor.is_online() {
            self.queue.enqueue(record).await;
            SubmitOutcome::Queued
        } else {
            match self.dispatch(&record, &resolved).await {
                Dispatch::Synced => SubmitOutcome::Synced,
                Dispatch::Retry(e) => {
                    tracing::info!(record_id = %record.id, error = %e, "Remote write failed; queueing for retry");
                    self.queue.enqueue(record.clone()).await;
                    SubmitOutcome::Queued
                }
                Dispatch::Invalid(message) => {
                    tracing::warn!(record_id = %record.id, error = %message, "Remote rejected attendance as invalid");
                    SubmitOutcome::Rejected(RejectReason::Validation(message))
                }
                Dispatch::Duplicate => SubmitOutcome::Rejected(RejectReason::DuplicateFound(ExistingEntry::at(
                    record.timestamp,
                    self.offset,
                ))),
            }
        };

        // a synced record is invisible to the local scan until the index
        // mirror lands, so its slot is kept for one more window
        if !force {
            if outcome == SubmitOutcome::Synced {
                self.guard.rearm(&candidate.key, record_id).await;
            } else {
                self.guard.release(&candidate.key, record_id).await;
            }
        }

        outcome
    }

    /// Primary-then-fallback remote write
    async fn dispatch(&self, record: &AttendanceRecord, resolved: &ResolvedAttendance) -> Dispatch {
        let row = AttendanceRow::build(record, resolved, self.offset);
        let limit = self.config.remote_timeout();

        let ledger_error = match with_timeout(limit, self.ledger.append(&row)).await {
            Ok(()) => {
                self.spawn_mirror(row).await;
                return Dispatch::Synced;
            }
            Err(e) if e.is_transient() => return Dispatch::Retry(e),
            Err(RemoteError::Validation(message)) => return Dispatch::Invalid(message),
            Err(e) => e,
        };

        tracing::warn!(record_id = %record.id, error = %ledger_error, store = "ledger", "Ledger write failed; trying index store");
        match with_timeout(limit, self.index.insert(&row)).await {
            Ok(()) => Dispatch::Synced,
            Err(RemoteError::Duplicate) => Dispatch::Duplicate,
            Err(e) => Dispatch::Retry(e),
        }
    }

    /// Best-effort index write after a ledger success, tracked until flushed
    async fn spawn_mirror(&self, row: AttendanceRow) {
        let index = Arc::clone(&self.index);
        let metrics = Arc::clone(&self.metrics);
        let limit = self.config.remote_timeout();

        let mut tasks = self.mirror_tasks.lock().await;
        // reap finished mirrors so the set stays small
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            match with_timeout(limit, index.insert(&row)).await {
                Ok(()) | Err(RemoteError::Duplicate) => {
                    tracing::debug!(record_id = %row.uuid, store = "index", "Mirror write succeeded");
                    metrics.record_mirror(true);
                }
                Err(e) => {
                    tracing::warn!(record_id = %row.uuid, store = "index", error = %e, "Mirror write failed");
                    metrics.record_mirror(false);
                }
            }
        });
    }

    /// Waits for every outstanding mirror write; returns how many finished
    pub async fn flush_mirror_writes(&self) -> usize {
        let mut tasks = std::mem::take(&mut *self.mirror_tasks.lock().await);
        let mut finished = 0;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Mirror write task panicked");
                self.metrics.record_mirror(false);
            }
            finished += 1;
        }
        finished
    }

    /// Drains the Pending queue once
    ///
    /// Records are dispatched one at a time with an adaptive delay between
    /// items. A second call while a pass is running returns immediately
    /// with `skipped` set.
    pub async fn periodic_sync(&self) -> SyncReport {
        if self
            .pass_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Sync pass already running; skipping");
            self.metrics.record_pass_skipped();
            return SyncReport {
                skipped: true,
                ..SyncReport::default()
            };
        }
        let _flag = PassFlag(&self.pass_running);

        self.queue.refresh().await;
        let pending = self.queue.list(Some(SyncStatus::Pending)).await;
        if pending.is_empty() {
            return SyncReport::default();
        }

        let mut report = SyncReport {
            total_count: pending.len(),
            ..SyncReport::default()
        };
        tracing::info!(pending = report.total_count, "Starting sync pass");

        let mut ready = Vec::with_capacity(pending.len());
        for record in pending {
            match self.resolver.references_resolve(&record).await {
                Ok(()) => ready.push(record),
                Err(e) => {
                    self.evict(record.id, &e.to_string()).await;
                    report.evicted += 1;
                }
            }
        }

        let mut delay = ItemDelay::new(self.config.item_delay(), self.config.max_item_delay());
        for (position, record) in ready.into_iter().enumerate() {
            if position > 0 && !delay.current().is_zero() {
                tokio::time::sleep(delay.current()).await;
            }

            if !self.monitor.is_online() {
                tracing::info!(remaining = report.total_count - report.success_count - report.evicted, "Connectivity lost; stopping sync pass");
                report.aborted = true;
                break;
            }

            let resolved = match self.resolver.resolve(&record).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    self.evict(record.id, &e.to_string()).await;
                    report.evicted += 1;
                    continue;
                }
            };

            if !record.force_inserted {
                let candidate = DuplicateCandidate::new(&record, &resolved, self.offset);
                match self.detector.find_remote(&candidate).await {
                    Ok(matches) if matches.iter().any(|found| found.uuid == record.id) => {
                        tracing::info!(record_id = %record.id, "Record already present remotely");
                        self.complete(record.id).await;
                        report.success_count += 1;
                        delay.on_success();
                        continue;
                    }
                    Ok(matches) if !matches.is_empty() => {
                        tracing::warn!(record_id = %record.id, existing = %matches[0].uuid, "duplicate_evicted: queued record duplicates a remote row");
                        self.evict(record.id, "duplicate of a remote row").await;
                        report.evicted += 1;
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(record_id = %record.id, error = %e, "Remote duplicate re-check failed; dispatching anyway");
                    }
                }
            }

            match self.dispatch(&record, &resolved).await {
                Dispatch::Synced => {
                    self.complete(record.id).await;
                    report.success_count += 1;
                    delay.on_success();
                }
                Dispatch::Retry(e) => {
                    tracing::info!(record_id = %record.id, error = %e, "Record stays pending");
                    if e.is_transient() {
                        delay.on_transient_failure();
                    }
                }
                Dispatch::Invalid(message) => {
                    self.evict(record.id, &message).await;
                    report.evicted += 1;
                }
                Dispatch::Duplicate => {
                    tracing::warn!(record_id = %record.id, "duplicate_evicted: index store rejected queued record");
                    self.evict(record.id, "remote duplicate").await;
                    report.evicted += 1;
                }
            }
        }

        self.finish_pass(&report).await;
        report
    }

    async fn finish_pass(&self, report: &SyncReport) {
        let now = Utc::now();
        self.metrics.record_pass(report.success_count, report.evicted);
        tracing::info!(
            success_count = report.success_count,
            total_count = report.total_count,
            evicted = report.evicted,
            aborted = report.aborted,
            "Sync pass finished"
        );

        if let Some(db) = &self.metadata {
            let persisted = match serde_json::to_string(report) {
                Ok(json) => db.record_sync_pass(now, &json).await.map_err(SyncError::from),
                Err(e) => Err(SyncError::from(e)),
            };
            if let Err(e) = persisted {
                tracing::warn!(error = %e, "Failed to persist sync metadata");
            }
        }

        *self.last_pass.write().await = Some((now, report.clone()));
    }

    /// Pending -> Synced, then drop from the queue
    async fn complete(&self, id: Uuid) {
        if let Err(e) = self.queue.update_status(id, SyncStatus::Synced).await {
            tracing::warn!(record_id = %id, error = %e, "Could not mark record synced");
        }
        self.queue.remove(id).await;
    }

    /// Pending -> Error, then drop from the queue
    async fn evict(&self, id: Uuid, reason: &str) {
        tracing::warn!(record_id = %id, reason, "Evicting queued attendance record");
        if let Err(e) = self.queue.update_status(id, SyncStatus::Error).await {
            tracing::warn!(record_id = %id, error = %e, "Could not mark record as error");
        }
        self.queue.remove(id).await;
    }

    /// Current sync status
    pub async fn status(&self) -> SyncStatusSnapshot {
        let last_pass = self.last_pass.read().await.clone();
        SyncStatusSnapshot {
            pending: self.queue.count_pending().await,
            running: self.pass_running.load(Ordering::SeqCst),
            online: self.monitor.is_online(),
            degraded: self.queue.is_degraded(),
            last_pass_at: last_pass.as_ref().map(|(at, _)| *at),
            last_report: last_pass.map(|(_, report)| report),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Start the background sync loop
    ///
    /// Runs a pass on every interval tick while online (when `auto_sync` is
    /// set) and on every offline -> online transition.
    pub async fn start(self: &Arc<Self>) -> Result<(), SyncError> {
        let mut slot = self.background_task.lock().await;
        if slot.is_some() {
            return Err(SyncError::AlreadyRunning);
        }

        // transitions after `start` returns must reach the loop
        let transitions = self.monitor.subscribe();
        let service = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            service.background_sync_loop(transitions).await;
        }));
        tracing::info!(interval_seconds = self.config.sync_interval_seconds, "Sync service started");
        Ok(())
    }

    /// Stop the background sync loop
    pub async fn stop(&self) {
        if let Some(handle) = self.background_task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
            tracing::info!("Sync service stopped");
        }
    }

    /// Stops the loop and waits for outstanding mirror writes
    pub async fn shutdown(&self) {
        self.stop().await;
        let flushed = self.flush_mirror_writes().await;
        tracing::info!(flushed, "Sync service shut down");
    }

    pub async fn is_running(&self) -> bool {
        self.background_task.lock().await.is_some()
    }

    async fn background_sync_loop(&self, mut transitions: watch::Receiver<bool>) {
        // interval() panics on a zero period
        let period = self.config.sync_interval().max(std::time::Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.config.auto_sync && self.monitor.is_online() {
                        self.periodic_sync().await;
                    }
                }
                changed = transitions.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Connectivity monitor closed; background sync exiting");
                        break;
                    }
                    let online = *transitions.borrow_and_update();
                    if online {
                        tracing::info!("Back online; draining local queue");
                        self.periodic_sync().await;
                    }
                }
            }
        }
    }
}
