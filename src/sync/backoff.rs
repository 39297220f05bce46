//! # Inter-Item Delay
//!
//! Delay policy for the sequential queue drain: a fixed base delay between
//! items, doubled after each consecutive transient failure up to a cap, and
//! reset by the next success.

use std::time::Duration;

/// Adaptive delay between two dispatched records
#[derive(Debug, Clone)]
pub struct ItemDelay {
    base: Duration,
    max: Duration,
    current: Duration,
    consecutive_failures: u32,
}

impl ItemDelay {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
            consecutive_failures: 0,
        }
    }

    /// Delay to wait before the next item
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn on_success(&mut self) {
        self.consecutive_failures = 0;
        self.current = self.base;
    }

    pub fn on_transient_failure(&mut self) {
        self.consecutive_failures += 1;
        self.current = self.current.saturating_mul(2).min(self.max);
    }
}
