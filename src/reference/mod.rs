//! # Reference Data
//!
//! Boundary to the roster and reference tables (communities, roles,
//! instruments, people). The core only ever resolves ids through these
//! traits; the concrete source is injected.
//!
//! ## Key Components
//!
//! - `ReferenceDataProvider`: id -> entity lookup
//! - `PersonDirectoryProvider`: roster lookup by community/role/instrument
//! - `StaticReferenceData`: in-memory implementation, loadable from JSON
//! - `ReferenceResolver`: turns a record into display values
//!
//! ## Usage
//!
//! ```rust,no_run
//! use attendsync::reference::{ReferenceResolver, StaticReferenceData};
//! use std::sync::Arc;
//!
//! # async fn example(record: attendsync::shared::record::AttendanceRecord) {
//! let data = Arc::new(StaticReferenceData::from_json_file("reference.json").await.unwrap());
//! let resolver = ReferenceResolver::new(data.clone(), data);
//! let resolved = resolver.resolve(&record).await;
//! # }
//! ```

use crate::shared::error::ValidationError;
use crate::shared::record::{AttendanceRecord, PersonRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Reference table an id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Community,
    Role,
    Instrument,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKind::Community => f.write_str("community"),
            ReferenceKind::Role => f.write_str("role"),
            ReferenceKind::Instrument => f.write_str("instrument"),
        }
    }
}

/// One row of a reference table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntity {
    pub id: String,
    pub name: String,
    /// Only meaningful for communities
    #[serde(default)]
    pub city: Option<String>,
}

/// Roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub full_name: String,
    /// Actual role held by the person; may differ from the form selection
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub organist_class: Option<String>,
}

/// Resolves reference ids to entities
#[async_trait]
pub trait ReferenceDataProvider: Send + Sync {
    async fn resolve(&self, kind: ReferenceKind, id: &str) -> Option<ReferenceEntity>;
}

/// Looks up people eligible for a community/role/instrument combination
#[async_trait]
pub trait PersonDirectoryProvider: Send + Sync {
    async fn lookup(&self, community_id: &str, role_id: &str, instrument_id: Option<&str>) -> Vec<Person>;
}

/// Display values of a record after reference resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttendance {
    pub full_name: String,
    pub community: String,
    pub city: Option<String>,
    /// Real role of the person (directory role when known, else form role)
    pub role: String,
    pub instrument: Option<String>,
    pub organist_class: Option<String>,
}

/// Resolves records against the injected providers
#[derive(Clone)]
pub struct ReferenceResolver {
    reference: Arc<dyn ReferenceDataProvider>,
    directory: Arc<dyn PersonDirectoryProvider>,
}

impl ReferenceResolver {
    pub fn new(
        reference: Arc<dyn ReferenceDataProvider>,
        directory: Arc<dyn PersonDirectoryProvider>,
    ) -> Self {
        Self {
            reference,
            directory,
        }
    }

    /// Checks that community and role still resolve
    pub async fn references_resolve(&self, record: &AttendanceRecord) -> Result<(), ValidationError> {
        self.require(ReferenceKind::Community, &record.community_ref).await?;
        self.require(ReferenceKind::Role, &record.role_ref).await?;
        Ok(())
    }

    /// Resolves every reference on `record` into display values
    pub async fn resolve(&self, record: &AttendanceRecord) -> Result<ResolvedAttendance, ValidationError> {
        let community = self.require(ReferenceKind::Community, &record.community_ref).await?;
        let role = self.require(ReferenceKind::Role, &record.role_ref).await?;
        let instrument = match record.instrument_ref.as_deref() {
            Some(id) if !id.trim().is_empty() => {
                Some(self.require(ReferenceKind::Instrument, id).await?.name)
            }
            _ => None,
        };

        let (full_name, real_role, roster_class) = match &record.person {
            PersonRef::Manual(name) => {
                if name.trim().is_empty() {
                    return Err(ValidationError::field("person", "manual name must not be empty"));
                }
                (name.trim().to_string(), role.name.clone(), None)
            }
            PersonRef::Roster(id) => {
                let people = self
                    .directory
                    .lookup(&record.community_ref, &record.role_ref, record.instrument_ref.as_deref())
                    .await;
                let person = people
                    .into_iter()
                    .find(|person| person.id == *id)
                    .ok_or_else(|| ValidationError::UnknownPerson { id: id.clone() })?;
                let real_role = person.role.clone().unwrap_or_else(|| role.name.clone());
                (person.full_name, real_role, person.organist_class)
            }
        };

        Ok(ResolvedAttendance {
            full_name,
            community: community.name,
            city: community.city,
            role: real_role,
            instrument,
            organist_class: record.organist_class.clone().or(roster_class),
        })
    }

    async fn require(&self, kind: ReferenceKind, id: &str) -> Result<ReferenceEntity, ValidationError> {
        self.reference
            .resolve(kind, id)
            .await
            .ok_or_else(|| ValidationError::unresolved(kind, id))
    }
}

/// Roster entry with the combination it is eligible for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub community_id: String,
    pub role_id: String,
    #[serde(default)]
    pub instrument_id: Option<String>,
    #[serde(flatten)]
    pub person: Person,
}

/// Serialized reference snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceSnapshot {
    #[serde(default)]
    pub communities: Vec<ReferenceEntity>,
    #[serde(default)]
    pub roles: Vec<ReferenceEntity>,
    #[serde(default)]
    pub instruments: Vec<ReferenceEntity>,
    #[serde(default)]
    pub roster: Vec<RosterEntry>,
}

/// In-memory reference data and roster
#[derive(Debug, Default)]
pub struct StaticReferenceData {
    tables: RwLock<HashMap<(ReferenceKind, String), ReferenceEntity>>,
    roster: RwLock<Vec<RosterEntry>>,
}

impl StaticReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ReferenceSnapshot) -> Self {
        let mut tables = HashMap::new();
        for (kind, rows) in [
            (ReferenceKind::Community, snapshot.communities),
            (ReferenceKind::Role, snapshot.roles),
            (ReferenceKind::Instrument, snapshot.instruments),
        ] {
            for row in rows {
                tables.insert((kind, row.id.clone()), row);
            }
        }
        Self {
            tables: RwLock::new(tables),
            roster: RwLock::new(snapshot.roster),
        }
    }

    /// Loads a snapshot from a JSON file
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let raw = tokio::fs::read_to_string(path).await?;
        let snapshot: ReferenceSnapshot = serde_json::from_str(&raw)?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub async fn insert(&self, kind: ReferenceKind, entity: ReferenceEntity) {
        self.tables.write().await.insert((kind, entity.id.clone()), entity);
    }

    /// Removes an entity, e.g. a community deleted upstream
    pub async fn remove(&self, kind: ReferenceKind, id: &str) -> Option<ReferenceEntity> {
        self.tables.write().await.remove(&(kind, id.to_string()))
    }

    pub async fn add_person(&self, entry: RosterEntry) {
        self.roster.write().await.push(entry);
    }
}

#[async_trait]
impl ReferenceDataProvider for StaticReferenceData {
    async fn resolve(&self, kind: ReferenceKind, id: &str) -> Option<ReferenceEntity> {
        self.tables.read().await.get(&(kind, id.to_string())).cloned()
    }
}

#[async_trait]
impl PersonDirectoryProvider for StaticReferenceData {
    async fn lookup(&self, community_id: &str, role_id: &str, instrument_id: Option<&str>) -> Vec<Person> {
        self.roster
            .read()
            .await
            .iter()
            .filter(|entry| entry.community_id == community_id && entry.role_id == role_id)
            .filter(|entry| match instrument_id {
                Some(instrument) => entry.instrument_id.as_deref() == Some(instrument),
                None => true,
            })
            .map(|entry| entry.person.clone())
            .collect()
    }
}
