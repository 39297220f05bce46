//! # Attendance Record
//!
//! Defines the attendance record shared by the queue, the duplicate detector
//! and the sync orchestrator, together with its sync lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//! Pending ──► Synced   (terminal, removed from the local queue)
//!    │
//!    └─────► Error    (terminal, evicted, never retried)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use attendsync::shared::record::{AttendanceDraft, AttendanceRecord, PersonRef};
//!
//! let draft = AttendanceDraft {
//!     id: None,
//!     person: PersonRef::Manual("Joao Silva".to_string()),
//!     community_ref: "c-cotia".to_string(),
//!     role_ref: "r-musico".to_string(),
//!     instrument_ref: None,
//!     organist_class: None,
//!     level: None,
//!     venue: "Cotia".to_string(),
//!     timestamp: chrono::Utc::now(),
//!     submitted_by: "Maria Souza".to_string(),
//!     notes: None,
//! };
//! let record = AttendanceRecord::from_draft(draft);
//! assert!(record.is_pending());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::{Uuid, Version};

/// Sync lifecycle state of an attendance record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Stored locally, waiting for a remote write
    Pending,
    /// Accepted by one of the remote stores
    Synced,
    /// Permanently rejected; evicted from the queue
    Error,
}

impl SyncStatus {
    /// Whether this state is terminal
    pub fn is_terminal(self) -> bool {
        !matches!(self, SyncStatus::Pending)
    }

    /// Whether `self -> next` is an allowed transition
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (SyncStatus::Pending, SyncStatus::Synced) | (SyncStatus::Pending, SyncStatus::Error)
        )
    }

    /// Storage label
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid sync status transition {from} -> {to}")]
pub struct StatusTransitionError {
    /// Current status
    pub from: SyncStatus,
    /// Requested status
    pub to: SyncStatus,
}

/// Who attended: a roster entry or a free-text name typed by the operator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PersonRef {
    /// Roster identifier, resolved through the person directory
    Roster(String),
    /// Free-text name
    Manual(String),
}

impl PersonRef {
    pub fn is_manual(&self) -> bool {
        matches!(self, PersonRef::Manual(_))
    }
}

/// Classification level of a musician or organist
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationLevel {
    Officialized,
    CultoOficial,
    Candidate,
}

impl ClassificationLevel {
    /// Label written to the remote stores
    pub fn label(self) -> &'static str {
        match self {
            ClassificationLevel::Officialized => "OFICIALIZADO",
            ClassificationLevel::CultoOficial => "CULTO OFICIAL",
            ClassificationLevel::Candidate => "CANDIDATO",
        }
    }
}

/// Raw submission coming from the form layer
///
/// The id is kept as text because it may be missing or malformed; it is
/// validated by [`AttendanceRecord::from_draft`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttendanceDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub person: PersonRef,
    pub community_ref: String,
    pub role_ref: String,
    #[serde(default)]
    pub instrument_ref: Option<String>,
    #[serde(default)]
    pub organist_class: Option<String>,
    #[serde(default)]
    pub level: Option<ClassificationLevel>,
    pub venue: String,
    pub timestamp: DateTime<Utc>,
    pub submitted_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Attendance event tracked by the offline queue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttendanceRecord {
    /// Version 4 UUID, primary correlation key in both remote stores
    pub id: Uuid,
    /// Attending person
    pub person: PersonRef,
    /// Community identifier (reference data)
    pub community_ref: String,
    /// Role identifier selected in the form (reference data)
    pub role_ref: String,
    /// Optional instrument identifier (reference data)
    pub instrument_ref: Option<String>,
    /// Derived organist class
    pub organist_class: Option<String>,
    /// Derived classification level
    pub level: Option<ClassificationLevel>,
    /// Registration location label
    pub venue: String,
    /// Event time
    pub timestamp: DateTime<Utc>,
    /// Operator display name
    pub submitted_by: String,
    /// Optional free text
    pub notes: Option<String>,
    /// Current lifecycle state
    sync_status: SyncStatus,
    /// Set when an operator confirmed a duplicate prompt
    #[serde(default)]
    pub force_inserted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    /// Builds a pending record, replacing any missing or invalid id
    pub fn from_draft(draft: AttendanceDraft) -> Self {
        let now = Utc::now();
        Self {
            id: ensure_v4(draft.id.as_deref()),
            person: draft.person,
            community_ref: draft.community_ref,
            role_ref: draft.role_ref,
            instrument_ref: draft.instrument_ref,
            organist_class: draft.organist_class,
            level: draft.level,
            venue: draft.venue,
            timestamp: draft.timestamp,
            submitted_by: draft.submitted_by,
            notes: draft.notes,
            sync_status: SyncStatus::Pending,
            force_inserted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    pub fn is_pending(&self) -> bool {
        self.sync_status == SyncStatus::Pending
    }

    /// Moves the record to `next`, rejecting anything but Pending -> terminal
    pub fn transition_to(&mut self, next: SyncStatus) -> Result<(), StatusTransitionError> {
        if !self.sync_status.can_transition_to(next) {
            return Err(StatusTransitionError {
                from: self.sync_status,
                to: next,
            });
        }
        self.sync_status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Re-asserts the id invariant on records read back from storage
    pub fn ensure_valid_id(&mut self) {
        if !is_v4(&self.id) {
            self.id = Uuid::new_v4();
        }
    }
}

/// Parses `raw` as a v4 UUID, generating a fresh one otherwise
pub fn ensure_v4(raw: Option<&str>) -> Uuid {
    raw.and_then(|value| Uuid::parse_str(value.trim()).ok())
        .filter(is_v4)
        .unwrap_or_else(Uuid::new_v4)
}

fn is_v4(id: &Uuid) -> bool {
    !id.is_nil() && id.get_version() == Some(Version::Random)
}
