//! Submission and periodic sync scenarios against fake remote stores

use crate::common::*;
use crate::{assert_duplicate, assert_invalid};
use attendsync::local_db::MemoryStorage;
use attendsync::reference::ReferenceKind;
use attendsync::remote::RemoteError;
use attendsync::shared::config::SyncConfig;
use attendsync::shared::record::{PersonRef, SyncStatus};
use attendsync::shared::row::AttendanceRow;
use attendsync::SubmitOutcome;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_scenario_a_online_submit_is_synced() {
    let h = Harness::new(true).await;

    let outcome = h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await;
    assert_eq!(outcome, SubmitOutcome::Synced);

    let rows = h.ledger.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].full_name, "JOAO SILVA");
    assert_eq!(rows[0].community, "COTIA");
    assert_eq!(rows[0].role, "MÚSICO");
    assert_eq!(rows[0].event_time, "01/01/2024 10:00:00");
    assert_eq!(rows[0].submitted_by, "MARIA SOUZA");

    assert_eq!(h.service.flush_mirror_writes().await, 1);
    assert_eq!(h.index.rows().len(), 1);
    assert_eq!(h.service.metrics().snapshot().mirror_succeeded, 1);
    assert_eq!(h.queue.count_pending().await, 0);
}

#[tokio::test]
async fn test_scenario_b_same_tuple_same_day_is_duplicate() {
    let h = Harness::new(true).await;
    assert_eq!(
        h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await,
        SubmitOutcome::Synced
    );
    h.service.flush_mirror_writes().await;

    let later = event_time() + ChronoDuration::hours(2);
    let existing = assert_duplicate!(h.service.submit_draft(draft("João  Silva", later), false).await);
    assert_eq!(existing.date, "01/01/2024");
    assert_eq!(existing.time, "10:00:00");

    // no persistence, no second remote write
    assert_eq!(h.ledger.rows().len(), 1);
    assert_eq!(h.queue.count_pending().await, 0);
}

#[tokio::test]
async fn test_double_submit_before_mirror_lands_is_rejected() {
    let h = Harness::new(true).await;
    assert_eq!(
        h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await,
        SubmitOutcome::Synced
    );

    let existing = assert_duplicate!(h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await);
    assert_eq!(existing.time, "10:00:00");
    assert_eq!(h.ledger.rows().len(), 1);
}

#[tokio::test]
async fn test_next_day_is_not_a_duplicate() {
    let h = Harness::new(true).await;
    h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await;
    h.service.flush_mirror_writes().await;

    let next_day = event_time() + ChronoDuration::days(1);
    assert_eq!(
        h.service.submit_draft(draft("JOAO SILVA", next_day), false).await,
        SubmitOutcome::Synced
    );
}

#[tokio::test]
async fn test_scenario_c_offline_then_sync() {
    let h = Harness::new(false).await;

    let outcome = h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await;
    assert_eq!(outcome, SubmitOutcome::Queued);
    assert_eq!(h.queue.count_pending().await, 1);

    h.monitor.set_online(true);
    let report = h.service.periodic_sync().await;
    assert_eq!(report.success_count, 1);
    assert_eq!(report.total_count, 1);
    assert_eq!(h.queue.count_pending().await, 0);
    assert_eq!(h.ledger.rows().len(), 1);
}

#[tokio::test]
async fn test_offline_submit_never_touches_remote() {
    let h = Harness::new(false).await;

    for (i, name) in ["ANA", "BIA", "CAIO"].iter().enumerate() {
        let ts = event_time() + ChronoDuration::minutes(i as i64);
        assert_eq!(h.service.submit_draft(draft(name, ts), false).await, SubmitOutcome::Queued);
    }

    assert_eq!(h.ledger.calls(), 0);
    assert_eq!(h.index.inserts(), 0);
    assert_eq!(h.index.queries(), 0);
    assert_eq!(h.queue.count_pending().await, 3);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_d_ledger_timeout_stays_pending() {
    let h = Harness::new(true).await;
    h.ledger.set_behavior(Behavior::Hang);

    let record = record("JOAO SILVA", event_time());
    let id = record.id;
    assert_eq!(h.service.submit(record, false).await, SubmitOutcome::Queued);

    let queued = h.queue.get(id).await.expect("record should be queued");
    assert_eq!(queued.sync_status(), SyncStatus::Pending);
    // a timeout is transient: no fallback write
    assert_eq!(h.index.inserts(), 0);

    let report = h.service.periodic_sync().await;
    assert_eq!(report.success_count, 0);
    assert_eq!(report.evicted, 0);
    assert_eq!(h.queue.get(id).await.unwrap().sync_status(), SyncStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_double_tap_during_slow_ledger_write_is_rejected() {
    let config = SyncConfig {
        remote_timeout_seconds: 10,
        guard_window_seconds: 3,
        ..test_sync_config()
    };
    let h = Harness::with_storage(true, Arc::new(MemoryStorage::new()), config).await;
    h.ledger.set_behavior(Behavior::Hang);

    let service = h.service.clone();
    let first = tokio::spawn(async move { service.submit_draft(draft("JOAO SILVA", event_time()), false).await });

    // past the guard window, first write still in flight
    tokio::time::sleep(Duration::from_secs(4)).await;
    let later = event_time() + ChronoDuration::minutes(1);
    let existing = assert_duplicate!(h.service.submit_draft(draft("João Silva", later), false).await);
    assert_eq!(existing.time, "10:00:00");

    assert_eq!(first.await.unwrap(), SubmitOutcome::Queued);
    assert_eq!(h.queue.count_pending().await, 1);
    assert_eq!(h.ledger.calls(), 1);
    assert!(h.ledger.rows().is_empty());
}

#[tokio::test]
async fn test_scenario_e_deleted_community_is_evicted() {
    let h = Harness::new(false).await;
    h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await;
    h.service.submit_draft(draft("ANA", event_time()), false).await;

    h.reference.remove(ReferenceKind::Community, "c1").await;
    h.monitor.set_online(true);

    let report = h.service.periodic_sync().await;
    assert_eq!(report.total_count, 2);
    assert_eq!(report.success_count, 0);
    assert_eq!(report.evicted, 2);
    assert!(h.queue.list(None).await.is_empty());
    assert_eq!(h.ledger.calls(), 0);
}

#[tokio::test]
async fn test_empty_periodic_sync_is_noop() {
    let h = Harness::new(true).await;

    for _ in 0..2 {
        let report = h.service.periodic_sync().await;
        assert_eq!((report.success_count, report.total_count), (0, 0));
        assert!(!report.skipped);
    }
    assert_eq!(h.ledger.calls(), 0);
}

#[tokio::test]
async fn test_unresolved_reference_is_rejected_on_submit() {
    let h = Harness::new(true).await;
    let mut bad = draft("JOAO SILVA", event_time());
    bad.community_ref = "missing".to_string();

    let message = assert_invalid!(h.service.submit_draft(bad, false).await);
    assert!(message.contains("missing"));
    assert_eq!(h.ledger.calls(), 0);
    assert_eq!(h.queue.count_pending().await, 0);
}

#[tokio::test]
async fn test_ledger_validation_error_is_rejected() {
    let h = Harness::new(true).await;
    h.ledger.push_behavior(Behavior::Fail(RemoteError::Validation("unknown community".to_string())));

    let message = assert_invalid!(h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await);
    assert_eq!(message, "unknown community");
    assert_eq!(h.index.inserts(), 0);
    assert_eq!(h.queue.count_pending().await, 0);
}

#[tokio::test]
async fn test_unknown_ledger_error_falls_back_to_index() {
    let h = Harness::new(true).await;
    h.ledger.push_behavior(Behavior::Fail(RemoteError::Unknown("500".to_string())));

    let outcome = h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await;
    assert_eq!(outcome, SubmitOutcome::Synced);
    assert!(h.ledger.rows().is_empty());
    assert_eq!(h.index.rows().len(), 1);
    // no mirror after a fallback write
    assert_eq!(h.service.flush_mirror_writes().await, 0);
}

#[tokio::test]
async fn test_fallback_duplicate_is_rejected() {
    let h = Harness::new(true).await;
    h.ledger.push_behavior(Behavior::Fail(RemoteError::Unknown("500".to_string())));
    h.index.push_behavior(Behavior::Fail(RemoteError::Duplicate));

    let existing = assert_duplicate!(h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await);
    assert_eq!(existing.date, "01/01/2024");
    assert_eq!(h.queue.count_pending().await, 0);
}

#[tokio::test]
async fn test_fallback_failure_is_queued() {
    let h = Harness::new(true).await;
    h.ledger.push_behavior(Behavior::Fail(RemoteError::Unknown("500".to_string())));
    h.index.push_behavior(Behavior::Fail(RemoteError::Unknown("502".to_string())));

    let outcome = h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await;
    assert_eq!(outcome, SubmitOutcome::Queued);
    assert_eq!(h.queue.count_pending().await, 1);
}

#[tokio::test]
async fn test_network_error_is_queued_without_fallback() {
    let h = Harness::new(true).await;
    h.ledger.push_behavior(Behavior::Fail(RemoteError::Network("connection reset".to_string())));

    let outcome = h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await;
    assert_eq!(outcome, SubmitOutcome::Queued);
    assert_eq!(h.index.inserts(), 0);
}

#[tokio::test]
async fn test_force_bypasses_duplicate_check() {
    let h = Harness::new(true).await;
    h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await;
    h.service.flush_mirror_writes().await;

    assert_duplicate!(h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await);
    assert_eq!(
        h.service.submit_draft(draft("JOAO SILVA", event_time()), true).await,
        SubmitOutcome::Synced
    );
    assert_eq!(h.ledger.rows().len(), 2);
}

#[tokio::test]
async fn test_offline_dedup_against_local_queue() {
    let h = Harness::new(false).await;
    assert_eq!(
        h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await,
        SubmitOutcome::Queued
    );
    assert_duplicate!(h.service.submit_draft(draft("joao silva", event_time()), false).await);

    // force still queues, and the pass does not re-check it remotely
    assert_eq!(
        h.service.submit_draft(draft("joao silva", event_time()), true).await,
        SubmitOutcome::Queued
    );
    assert_eq!(h.queue.count_pending().await, 2);
    let forced = h.queue.list(None).await.into_iter().filter(|r| r.force_inserted).count();
    assert_eq!(forced, 1);
}

#[tokio::test]
async fn test_roster_name_compared_with_manual_entry() {
    let h = Harness::new(true).await;
    let mut roster = draft("", event_time());
    roster.person = PersonRef::Roster("p1".to_string());
    roster.instrument_ref = Some("i1".to_string());

    assert_eq!(h.service.submit_draft(roster, false).await, SubmitOutcome::Synced);
    let row = &h.ledger.rows()[0];
    assert_eq!(row.full_name, "JOAO SILVA");
    assert_eq!(row.instrument, "VIOLINO");
    assert_eq!(row.naipe, "CORDAS");

    h.service.flush_mirror_writes().await;
    assert_duplicate!(h.service.submit_draft(draft("João Silva", event_time()), false).await);
}

#[tokio::test]
async fn test_retry_convergence() {
    let h = Harness::new(true).await;
    h.ledger.push_behavior(Behavior::Fail(RemoteError::Timeout));
    let record = record("JOAO SILVA", event_time());
    let id = record.id;
    assert_eq!(h.service.submit(record, false).await, SubmitOutcome::Queued);

    // two more transient failures before the ledger recovers
    h.ledger.push_behavior(Behavior::Fail(RemoteError::Network("reset".to_string())));
    h.ledger.push_behavior(Behavior::Fail(RemoteError::Timeout));

    let mut passes = 0;
    while h.queue.count_pending().await > 0 {
        passes += 1;
        assert!(passes <= 5, "record did not converge");
        h.service.periodic_sync().await;
    }
    assert_eq!(passes, 3);
    assert_eq!(h.ledger.rows()[0].uuid, id);
}

#[tokio::test]
async fn test_queued_record_already_present_remotely_counts_as_synced() {
    let h = Harness::new(false).await;
    let record = record("JOAO SILVA", event_time());
    let id = record.id;
    h.service.submit(record, false).await;

    // an abandoned write that landed after all
    let mut row = ledger_row(id);
    row.full_name = "JOAO SILVA".to_string();
    h.index.seed(row);

    h.monitor.set_online(true);
    let report = h.service.periodic_sync().await;
    assert_eq!(report.success_count, 1);
    assert_eq!(h.ledger.calls(), 0);
    assert!(h.queue.list(None).await.is_empty());
}

#[tokio::test]
async fn test_queued_duplicate_of_other_device_is_evicted() {
    let h = Harness::new(false).await;
    h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await;

    let mut row = ledger_row(Uuid::new_v4());
    row.full_name = "JOÃO SILVA".to_string();
    h.index.seed(row);

    h.monitor.set_online(true);
    let report = h.service.periodic_sync().await;
    assert_eq!(report.success_count, 0);
    assert_eq!(report.evicted, 1);
    assert_eq!(h.ledger.calls(), 0);
    assert!(h.queue.list(None).await.is_empty());
}

#[tokio::test]
async fn test_forced_record_skips_remote_recheck() {
    let h = Harness::new(false).await;
    h.service.submit_draft(draft("JOAO SILVA", event_time()), true).await;

    let mut row = ledger_row(Uuid::new_v4());
    row.full_name = "JOAO SILVA".to_string();
    h.index.seed(row);

    h.monitor.set_online(true);
    let report = h.service.periodic_sync().await;
    assert_eq!(report.success_count, 1);
    assert_eq!(h.ledger.rows().len(), 1);
}

#[tokio::test]
async fn test_pass_stops_when_offline() {
    let h = Harness::new(false).await;
    h.service.submit_draft(draft("ANA", event_time()), false).await;
    h.service.submit_draft(draft("BIA", event_time()), false).await;

    let report = h.service.periodic_sync().await;
    assert!(report.aborted);
    assert_eq!(report.success_count, 0);
    assert_eq!(h.queue.count_pending().await, 2);
    assert_eq!(h.ledger.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_pass_is_skipped() {
    let h = Harness::new(false).await;
    h.service.submit_draft(draft("ANA", event_time()), false).await;
    h.monitor.set_online(true);
    h.ledger.set_behavior(Behavior::Hang);

    let (first, second) = tokio::join!(h.service.periodic_sync(), h.service.periodic_sync());
    assert!(!first.skipped);
    assert!(second.skipped);
    assert_eq!(h.service.metrics().snapshot().passes_skipped, 1);

    // the flag is cleared once the pass ends
    let third = h.service.periodic_sync().await;
    assert!(!third.skipped);
}

#[tokio::test]
async fn test_mirror_failure_is_counted_not_surfaced() {
    let h = Harness::new(true).await;
    h.index.set_behavior(Behavior::Fail(RemoteError::Unknown("503".to_string())));

    let outcome = h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await;
    assert_eq!(outcome, SubmitOutcome::Synced);

    h.service.flush_mirror_writes().await;
    let metrics = h.service.metrics().snapshot();
    assert_eq!(metrics.mirror_failed, 1);
    assert_eq!(metrics.mirror_succeeded, 0);
}

#[tokio::test]
async fn test_status_snapshot() {
    let h = Harness::new(false).await;
    h.service.submit_draft(draft("ANA", event_time()), false).await;

    let status = h.service.status().await;
    assert_eq!(status.pending, 1);
    assert!(!status.online);
    assert!(!status.running);
    assert!(!status.degraded);
    assert!(status.last_pass_at.is_none());

    h.monitor.set_online(true);
    h.service.periodic_sync().await;
    let status = h.service.status().await;
    assert_eq!(status.pending, 0);
    assert_eq!(status.last_report.map(|r| r.success_count), Some(1));
    assert_eq!(status.metrics.submissions_queued, 1);
}

#[tokio::test]
async fn test_every_submit_returns_an_outcome() {
    let h = Harness::new(true).await;
    let failures = [
        Behavior::Accept,
        Behavior::Fail(RemoteError::Timeout),
        Behavior::Fail(RemoteError::Validation("bad".to_string())),
        Behavior::Fail(RemoteError::Duplicate),
        Behavior::Fail(RemoteError::Unknown("?".to_string())),
    ];

    for (i, behavior) in failures.into_iter().enumerate() {
        h.ledger.push_behavior(behavior);
        let ts = Utc.with_ymd_and_hms(2024, 2, 1 + i as u32, 13, 0, 0).unwrap();
        let outcome = h.service.submit_draft(draft("ANA", ts), false).await;
        assert!(matches!(
            outcome,
            SubmitOutcome::Synced | SubmitOutcome::Queued | SubmitOutcome::Rejected(_)
        ));
    }
}

fn ledger_row(uuid: Uuid) -> AttendanceRow {
    AttendanceRow {
        uuid,
        full_name: String::new(),
        community: "COTIA".to_string(),
        city: "COTIA".to_string(),
        role: "MÚSICO".to_string(),
        instrument: String::new(),
        naipe: String::new(),
        organist_class: String::new(),
        level: String::new(),
        venue: "COTIA".to_string(),
        event_time: "01/01/2024 09:00:00".to_string(),
        submitted_by: "OUTRO OPERADOR".to_string(),
        notes: String::new(),
        recorded_at: event_time() - ChronoDuration::hours(1),
    }
}
