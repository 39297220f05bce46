//! Reference data, records and a wired sync service

use crate::common::fakes::{FakeIndex, FakeLedger};
use attendsync::local_db::{KeyValueStorage, MemoryStorage};
use attendsync::offline::LocalQueueStore;
use attendsync::reference::{Person, ReferenceEntity, ReferenceKind, ReferenceResolver, RosterEntry, StaticReferenceData};
use attendsync::shared::config::SyncConfig;
use attendsync::shared::record::{AttendanceDraft, AttendanceRecord, PersonRef};
use attendsync::sync::{NetworkMonitor, SyncComponents, SyncService};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// 2024-01-01 10:00 in UTC-3
pub fn event_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap()
}

/// Fast timings for tests; the background loop is off
pub fn test_sync_config() -> SyncConfig {
    SyncConfig {
        auto_sync: false,
        sync_interval_seconds: 1,
        item_delay_ms: 1,
        max_item_delay_ms: 4,
        remote_timeout_seconds: 1,
        guard_window_seconds: 3,
        utc_offset_minutes: -180,
    }
}

fn entity(id: &str, name: &str, city: Option<&str>) -> ReferenceEntity {
    ReferenceEntity {
        id: id.to_string(),
        name: name.to_string(),
        city: city.map(str::to_string),
    }
}

/// Communities c1 (COTIA) and c2 (ITAPEVI), roles r1 (MÚSICO) and
/// r2 (ORGANISTA), instrument i1 (VIOLINO), roster person p1
pub async fn reference_data() -> Arc<StaticReferenceData> {
    let data = StaticReferenceData::new();
    data.insert(ReferenceKind::Community, entity("c1", "COTIA", Some("COTIA"))).await;
    data.insert(ReferenceKind::Community, entity("c2", "ITAPEVI", Some("ITAPEVI"))).await;
    data.insert(ReferenceKind::Role, entity("r1", "MÚSICO", None)).await;
    data.insert(ReferenceKind::Role, entity("r2", "ORGANISTA", None)).await;
    data.insert(ReferenceKind::Instrument, entity("i1", "VIOLINO", None)).await;
    data.add_person(RosterEntry {
        community_id: "c1".to_string(),
        role_id: "r1".to_string(),
        instrument_id: Some("i1".to_string()),
        person: Person {
            id: "p1".to_string(),
            full_name: "JOAO SILVA".to_string(),
            role: None,
            organist_class: None,
        },
    })
    .await;
    Arc::new(data)
}

/// Manual-name draft in community c1 / role r1
pub fn draft(name: &str, timestamp: DateTime<Utc>) -> AttendanceDraft {
    AttendanceDraft {
        id: None,
        person: PersonRef::Manual(name.to_string()),
        community_ref: "c1".to_string(),
        role_ref: "r1".to_string(),
        instrument_ref: None,
        organist_class: None,
        level: None,
        venue: "COTIA".to_string(),
        timestamp,
        submitted_by: "Maria da Silva Souza".to_string(),
        notes: None,
    }
}

pub fn record(name: &str, timestamp: DateTime<Utc>) -> AttendanceRecord {
    AttendanceRecord::from_draft(draft(name, timestamp))
}

/// Sync service wired to fakes
pub struct Harness {
    pub service: Arc<SyncService>,
    pub ledger: Arc<FakeLedger>,
    pub index: Arc<FakeIndex>,
    pub monitor: Arc<NetworkMonitor>,
    pub reference: Arc<StaticReferenceData>,
    pub queue: Arc<LocalQueueStore>,
    pub storage: Arc<dyn KeyValueStorage>,
}

impl Harness {
    pub async fn new(online: bool) -> Self {
        Self::with_storage(online, Arc::new(MemoryStorage::new()), test_sync_config()).await
    }

    pub async fn with_storage(online: bool, storage: Arc<dyn KeyValueStorage>, config: SyncConfig) -> Self {
        let ledger = Arc::new(FakeLedger::new());
        let index = Arc::new(FakeIndex::new());
        let monitor = Arc::new(NetworkMonitor::new(online));
        let reference = reference_data().await;
        let queue = Arc::new(LocalQueueStore::load(storage.clone()).await);

        let components = SyncComponents {
            queue: queue.clone(),
            ledger: ledger.clone(),
            index: index.clone(),
            resolver: ReferenceResolver::new(reference.clone(), reference.clone()),
            monitor: monitor.clone(),
        };

        Self {
            service: Arc::new(SyncService::new(config, components)),
            ledger,
            index,
            monitor,
            reference,
            queue,
            storage,
        }
    }
}
