//! Attendsync - Offline Attendance Sync Engine
//!
//! Attendsync lets field operators register attendance events without
//! network connectivity and later reconciles the locally queued entries
//! against two independent remote stores, without duplicate or lost rows.
//!
//! # Module Structure
//!
//! - **`shared`** - record model, normalization, remote row format,
//!   configuration and error types
//! - **`reference`** - reference data and roster lookups
//! - **`local_db`** - SQLite-backed key-value storage and sync metadata
//! - **`offline`** - local queue, duplicate detector, concurrency guard
//! - **`remote`** - ledger and index store contracts plus HTTP adapters
//! - **`sync`** - the sync orchestrator, connectivity monitor and metrics
//!
//! # Delivery Model
//!
//! At-least-once with client-side dedup. There is no atomicity across the
//! two remote stores; two devices registering the same person inside the
//! same race window are reconciled by the next sync pass, not prevented.
//!
//! # Error Handling
//!
//! - `SyncService::submit` never fails: every path ends in a `SubmitOutcome`
//! - adapters raise typed `RemoteError`s; classification is structural
//! - construction and storage APIs return `Result<T, SyncError>`

/// Shared types and data structures
pub mod shared;

/// Reference data boundary
pub mod reference;

/// Local persistent storage
pub mod local_db;

/// Offline queue and dedup
pub mod offline;

/// Remote store contracts and adapters
pub mod remote;

/// Sync orchestration
pub mod sync;

pub use shared::record::{AttendanceDraft, AttendanceRecord, PersonRef, SyncStatus};
pub use sync::{RejectReason, SubmitOutcome, SyncReport, SyncService};
