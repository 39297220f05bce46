//! # Concurrency Guard
//!
//! Key-scoped debounce lock over [`DedupKey`]. A submission claims the slot
//! before its save decision and keeps it through the remote write, so a
//! double tap cannot save the same event twice before the duplicate detector
//! can see the first copy.
//!
//! While the write is in flight the slot lives for the window plus the
//! longest possible remote exchange. Once the decision is made the owner
//! either releases it or re-arms it for one more window. Only the owner can
//! release or re-arm a slot.

use crate::shared::normalize::DedupKey;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

/// Per-key lock map with TTL expiry
#[derive(Debug)]
pub struct ConcurrencyGuard {
    window: Duration,
    in_flight: Duration,
    slots: Mutex<HashMap<DedupKey, Slot>>,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    owner: Uuid,
    expires_at: Instant,
    /// Event time of the record holding the slot
    held_for: DateTime<Utc>,
}

impl ConcurrencyGuard {
    /// `in_flight` bounds how long the owner may spend on remote writes
    pub fn new(window: Duration, in_flight: Duration) -> Self {
        Self {
            window,
            in_flight,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Claims the slot for `key` on behalf of record `owner` timed `event_time`
    ///
    /// Never waits. When another record holds the slot, returns the event
    /// time of the record that claimed it.
    pub async fn try_acquire(
        &self,
        key: &DedupKey,
        owner: Uuid,
        event_time: DateTime<Utc>,
    ) -> Result<(), DateTime<Utc>> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        slots.retain(|_, slot| slot.expires_at > now);

        if let Some(slot) = slots.get(key) {
            tracing::debug!(key = %key, holder = %slot.owner, "Concurrency guard busy");
            return Err(slot.held_for);
        }
        slots.insert(
            key.clone(),
            Slot {
                owner,
                expires_at: now + self.window + self.in_flight,
                held_for: event_time,
            },
        );
        Ok(())
    }

    /// Keeps the slot for one more window, counted from now
    pub async fn rearm(&self, key: &DedupKey, owner: Uuid) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(key).filter(|slot| slot.owner == owner) {
            slot.expires_at = Instant::now() + self.window;
        }
    }

    /// Frees the slot before it expires, if `owner` still holds it
    pub async fn release(&self, key: &DedupKey, owner: Uuid) {
        let mut slots = self.slots.lock().await;
        if slots.get(key).map_or(false, |slot| slot.owner == owner) {
            slots.remove(key);
        }
    }

    /// Whether `key` is currently held
    pub async fn is_held(&self, key: &DedupKey) -> bool {
        let slots = self.slots.lock().await;
        slots
            .get(key)
            .map_or(false, |slot| slot.expires_at > Instant::now())
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
