//! Simulated clock for deterministic position timestamps.
//!
//! Position timestamps and cache ages are measured against this clock, not
//! wall time, so tests control exactly what "now" means. Cloned handles
//! share one underlying counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared simulated monotonic clock with millisecond resolution.
///
/// The clock only moves when a test moves it. [`SimClock::set_ms`] may move
/// it backwards; positions acquired after a rewind carry earlier timestamps,
/// which is the one sanctioned way successive deliveries on a watch can see
/// time go backwards.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    current_ms: Arc<AtomicU64>,
}

impl SimClock {
    /// Create a clock starting at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock starting at the given millisecond value
    #[must_use]
    pub fn starting_at(ms: u64) -> Self {
        let clock = Self::new();
        clock.set_ms(ms);
        clock
    }

    /// Current simulated time in milliseconds
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }

    /// Advance the clock
    pub fn advance(&self, by: Duration) {
        let _ = self
            .current_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Set the clock to an absolute value; moving backwards is allowed
    pub fn set_ms(&self, ms: u64) {
        self.current_ms.store(ms, Ordering::SeqCst);
    }
}
