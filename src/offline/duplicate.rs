//! # Duplicate Detector
//!
//! Decides whether an equivalent attendance record already exists for the
//! same local day. Comparison is exact after normalization of name,
//! community and role; roster-backed names are compared through their
//! resolved display name.
//!
//! Remote lookups go to the index store only while online and never block a
//! submission when they fail: the local scan still runs and the next sync
//! pass re-checks remotely.

use crate::offline::queue::LocalQueueStore;
use crate::reference::{ReferenceResolver, ResolvedAttendance};
use crate::remote::{with_timeout, IndexQuery, IndexStore, RemoteError, RemoteMatch};
use crate::shared::normalize::{day_bounds, local_date, DedupKey};
use crate::shared::record::{AttendanceRecord, SyncStatus};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// When the already-registered entry happened, for the confirmation prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingEntry {
    /// `dd/mm/yyyy`
    pub date: String,
    /// `HH:MM:SS`
    pub time: String,
}

impl ExistingEntry {
    pub fn at(timestamp: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = timestamp.with_timezone(&offset);
        Self {
            date: local.format("%d/%m/%Y").to_string(),
            time: local.format("%H:%M:%S").to_string(),
        }
    }
}

/// Result of a duplicate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateCheck {
    NoMatch,
    DuplicateFound(ExistingEntry),
}

impl DuplicateCheck {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DuplicateCheck::DuplicateFound(_))
    }
}

/// Resolved candidate under test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateCandidate {
    pub id: Uuid,
    pub key: DedupKey,
    pub name: String,
    pub community: String,
    pub role: String,
    pub timestamp: DateTime<Utc>,
}

impl DuplicateCandidate {
    pub fn new(record: &AttendanceRecord, resolved: &ResolvedAttendance, offset: FixedOffset) -> Self {
        let date = local_date(record.timestamp, offset);
        Self {
            id: record.id,
            key: DedupKey::new(&resolved.full_name, &resolved.community, &resolved.role, date),
            name: resolved.full_name.clone(),
            community: resolved.community.clone(),
            role: resolved.role.clone(),
            timestamp: record.timestamp,
        }
    }
}

/// Local + remote duplicate lookup
pub struct DuplicateDetector {
    index: Arc<dyn IndexStore>,
    queue: Arc<LocalQueueStore>,
    resolver: ReferenceResolver,
    offset: FixedOffset,
    timeout: Duration,
}

impl DuplicateDetector {
    pub fn new(
        index: Arc<dyn IndexStore>,
        queue: Arc<LocalQueueStore>,
        resolver: ReferenceResolver,
        offset: FixedOffset,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            queue,
            resolver,
            offset,
            timeout,
        }
    }

    /// Checks the index store (when `online`) and the local Pending queue
    pub async fn check(&self, candidate: &DuplicateCandidate, online: bool) -> DuplicateCheck {
        if online {
            match self.find_remote(candidate).await {
                Ok(matches) => {
                    if let Some(found) = matches.first() {
                        tracing::info!(record_id = %candidate.id, existing = %found.uuid, key = %candidate.key, "Duplicate found remotely");
                        return DuplicateCheck::DuplicateFound(ExistingEntry::at(found.recorded_at, self.offset));
                    }
                }
                Err(e) => {
                    tracing::warn!(record_id = %candidate.id, error = %e, "Remote duplicate lookup failed; checking local queue only");
                }
            }
        }

        self.check_local(candidate).await
    }

    /// Linear scan of the local Pending queue
    pub async fn check_local(&self, candidate: &DuplicateCandidate) -> DuplicateCheck {
        for queued in self.queue.list(Some(SyncStatus::Pending)).await {
            if queued.id == candidate.id {
                continue;
            }
            // unresolvable entries are evicted by the next sync pass
            let Ok(resolved) = self.resolver.resolve(&queued).await else {
                continue;
            };
            let date = local_date(queued.timestamp, self.offset);
            if candidate.key.matches(&resolved.full_name, &resolved.community, &resolved.role, date) {
                tracing::info!(record_id = %candidate.id, existing = %queued.id, key = %candidate.key, "Duplicate found in local queue");
                return DuplicateCheck::DuplicateFound(ExistingEntry::at(queued.timestamp, self.offset));
            }
        }
        DuplicateCheck::NoMatch
    }

    /// Index rows matching the candidate's key on its local day
    pub async fn find_remote(&self, candidate: &DuplicateCandidate) -> Result<Vec<RemoteMatch>, RemoteError> {
        let (from, to) = day_bounds(candidate.timestamp, self.offset);
        let query = IndexQuery {
            name: candidate.name.clone(),
            community: candidate.community.clone(),
            role: candidate.role.clone(),
            from,
            to,
        };
        with_timeout(self.timeout, self.index.find_matches(&query)).await
    }
}
