//! # Network Monitor
//!
//! Connectivity contract consumed by the sync service, a watch-channel
//! implementation fed by the host, and an optional HTTP reachability probe.
//!
//! ## Features
//!
//! - **Point-in-time check**: `is_online()` before every submit and item
//! - **Transitions**: `subscribe()` yields a `watch::Receiver<bool>` that
//!   changes on every online/offline flip

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Online/offline source
pub trait ConnectivityMonitor: Send + Sync {
    fn is_online(&self) -> bool;

    /// Receiver notified on every transition
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity state set by the host platform or by [`HttpProbe`]
#[derive(Debug)]
pub struct NetworkMonitor {
    state: watch::Sender<bool>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self { state }
    }

    /// Records the current state; returns whether it changed
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                tracing::info!("Network connectivity restored");
            } else {
                tracing::warn!("Network connectivity lost");
            }
        }
        changed
    }
}

impl ConnectivityMonitor for NetworkMonitor {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

/// Periodic HTTP reachability check feeding a [`NetworkMonitor`]
///
/// Any HTTP response counts as reachable; only transport failures mark the
/// device offline.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
    interval: Duration,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, interval: Duration, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            interval,
        })
    }

    pub async fn probe_once(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "Reachability probe failed");
                false
            }
        }
    }

    /// Runs the probe forever, updating `monitor`
    pub fn spawn(self, monitor: Arc<NetworkMonitor>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let online = self.probe_once().await;
                monitor.set_online(online);
            }
        })
    }
}
