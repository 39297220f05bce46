//! Attendsync daemon
//!
//! Loads configuration, opens the local queue, runs the background sync
//! loop and reads submissions from stdin, one per line:
//!
//! - a JSON attendance draft, optionally with `"force": true`
//! - `status` prints the sync status snapshot
//! - `sync` runs one periodic pass immediately
//!
//! Every answer is printed to stdout as one JSON line.

use attendsync::local_db::LocalDatabase;
use attendsync::offline::LocalQueueStore;
use attendsync::reference::{ReferenceResolver, StaticReferenceData};
use attendsync::remote::{HttpIndexStore, HttpLedgerStore};
use attendsync::shared::config::AppConfig;
use attendsync::shared::record::AttendanceDraft;
use attendsync::sync::{HttpProbe, NetworkMonitor, SyncComponents, SyncService};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_PROBE_INTERVAL_SECONDS: u64 = 15;

#[derive(Debug, Deserialize)]
struct Submission {
    #[serde(flatten)]
    draft: AttendanceDraft,
    #[serde(default)]
    force: bool,
}

#[derive(Debug)]
enum Command {
    Submit(Box<Submission>),
    Status,
    Sync,
}

fn parse_line(line: &str) -> Result<Option<Command>, serde_json::Error> {
    match line.trim() {
        "" => Ok(None),
        "status" => Ok(Some(Command::Status)),
        "sync" => Ok(Some(Command::Sync)),
        json => Ok(Some(Command::Submit(Box::new(serde_json::from_str(json)?)))),
    }
}

async fn handle_line(service: &SyncService, line: &str) -> serde_json::Value {
    match parse_line(line) {
        Ok(Some(Command::Submit(submission))) => {
            let outcome = service.submit_draft(submission.draft, submission.force).await;
            serde_json::to_value(outcome).unwrap_or_default()
        }
        Ok(Some(Command::Status)) => serde_json::to_value(service.status().await).unwrap_or_default(),
        Ok(Some(Command::Sync)) => serde_json::to_value(service.periodic_sync().await).unwrap_or_default(),
        Ok(None) => serde_json::Value::Null,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed input line");
            serde_json::json!({ "error": e.to_string() })
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .or_else(|| config.log_filter.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    let timeout = config.sync.remote_timeout();
    let db = LocalDatabase::open(config.database_path()).await?;

    let reference = match &config.reference_data_path {
        Some(path) => StaticReferenceData::from_json_file(path).await?,
        None => {
            tracing::warn!("No reference data configured; every submission will fail validation");
            StaticReferenceData::new()
        }
    };
    let reference = Arc::new(reference);

    let ledger = HttpLedgerStore::new(config.require_ledger_url()?, timeout)?;
    let index = HttpIndexStore::new(
        config.require_index_url()?,
        config.index_api_key.clone(),
        config.index_table.clone(),
        timeout,
    )?;

    // without a probe the host is assumed online; remote timeouts still queue
    let monitor = Arc::new(NetworkMonitor::new(config.probe_url.is_none()));
    let probe_task = match &config.probe_url {
        Some(url) => {
            let interval = Duration::from_secs(config.probe_interval_seconds.unwrap_or(DEFAULT_PROBE_INTERVAL_SECONDS));
            let probe = HttpProbe::new(url.clone(), interval, timeout)?;
            monitor.set_online(probe.probe_once().await);
            Some(probe.spawn(Arc::clone(&monitor)))
        }
        None => None,
    };

    let queue = Arc::new(LocalQueueStore::load(Arc::new(db.clone())).await);
    let components = SyncComponents {
        queue,
        ledger: Arc::new(ledger),
        index: Arc::new(index),
        resolver: ReferenceResolver::new(reference.clone(), reference),
        monitor,
    };
    let service = Arc::new(SyncService::new(config.sync.clone(), components).with_metadata(db));
    if let Err(e) = service.restore_metadata().await {
        tracing::warn!(error = %e, "Could not restore sync metadata");
    }
    service.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let answer = handle_line(&service, &line).await;
                if !answer.is_null() {
                    println!("{answer}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted; shutting down");
                break;
            }
        }
    }

    if let Some(task) = probe_task {
        task.abort();
    }
    service.shutdown().await;
    Ok(())
}
