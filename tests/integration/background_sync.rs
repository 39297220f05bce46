//! Background loop: connectivity transitions and the interval timer

use crate::common::*;
use assert_matches::assert_matches;
use attendsync::shared::error::SyncError;
use attendsync::SubmitOutcome;
use std::time::Duration;

async fn wait_until_drained(h: &Harness) {
    for _ in 0..200 {
        if h.queue.count_pending().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queue was not drained");
}

#[tokio::test]
async fn test_reconnect_triggers_drain() {
    let h = Harness::new(false).await;
    assert_eq!(
        h.service.submit_draft(draft("JOAO SILVA", event_time()), false).await,
        SubmitOutcome::Queued
    );

    h.service.start().await.unwrap();
    assert!(h.service.is_running().await);

    h.monitor.set_online(true);
    wait_until_drained(&h).await;
    assert_eq!(h.ledger.rows().len(), 1);

    h.service.shutdown().await;
    assert!(!h.service.is_running().await);
}

#[tokio::test]
async fn test_interval_drains_while_online() {
    let mut config = test_sync_config();
    config.auto_sync = true;
    let h = Harness::with_storage(false, std::sync::Arc::new(attendsync::local_db::MemoryStorage::new()), config).await;
    h.service.submit_draft(draft("ANA", event_time()), false).await;

    // flip online without a transition being observed by the loop
    h.monitor.set_online(true);
    h.service.start().await.unwrap();

    wait_until_drained(&h).await;
    h.service.stop().await;
}

#[tokio::test]
async fn test_start_twice_is_an_error() {
    let h = Harness::new(true).await;
    h.service.start().await.unwrap();
    assert_matches!(h.service.start().await, Err(SyncError::AlreadyRunning));
    h.service.stop().await;

    // restartable after stop
    h.service.start().await.unwrap();
    h.service.stop().await;
}

#[tokio::test]
async fn test_offline_loop_does_not_sync() {
    let mut config = test_sync_config();
    config.auto_sync = true;
    let h = Harness::with_storage(false, std::sync::Arc::new(attendsync::local_db::MemoryStorage::new()), config).await;
    h.service.submit_draft(draft("ANA", event_time()), false).await;

    h.service.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.service.stop().await;

    assert_eq!(h.queue.count_pending().await, 1);
    assert_eq!(h.ledger.calls(), 0);
}
