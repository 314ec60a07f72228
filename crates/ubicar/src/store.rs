//! Coordinate ground-truth store.
//!
//! Holds the current "true" coordinates per accuracy tier, owned by the
//! test-control surface. Offers a pull API (read, with simulated latency)
//! and a push API (change broadcast), following the shared provider
//! pattern: cloned handles address one underlying store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;

use crate::position::{AccuracyTier, Coordinates};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Fault produced when the store is scripted to fail reads.
///
/// Never escapes to position consumers; the acquisition engine normalizes
/// it to `POSITION_UNAVAILABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreReadFault;

/// Shared holder of ground-truth coordinates, one slot per accuracy tier
#[derive(Debug, Clone)]
pub struct CoordinateStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    slots: Mutex<[Option<Coordinates>; 2]>,
    changes: broadcast::Sender<AccuracyTier>,
    read_delay_ms: AtomicU64,
    fail_reads: AtomicBool,
}

impl Default for CoordinateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinateStore {
    /// Create an empty store: no fix on either tier
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                slots: Mutex::new([None, None]),
                changes,
                read_delay_ms: AtomicU64::new(0),
                fail_reads: AtomicBool::new(false),
            }),
        }
    }

    /// Whether two handles address the same underlying store
    #[must_use]
    pub fn same_store(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // === Test-control surface ===

    /// Set the ground truth for one tier and notify subscribers
    pub fn set(&self, tier: AccuracyTier, coords: Coordinates) {
        self.inner.slots.lock().unwrap()[tier.index()] = Some(coords);
        debug!(%tier, "coordinate store updated");
        let _ = self.inner.changes.send(tier);
    }

    /// Set the same ground truth for both tiers
    pub fn set_both(&self, coords: Coordinates) {
        self.set(AccuracyTier::Low, coords.clone());
        self.set(AccuracyTier::High, coords);
    }

    /// Drop the fix for one tier and notify subscribers
    pub fn clear(&self, tier: AccuracyTier) {
        self.inner.slots.lock().unwrap()[tier.index()] = None;
        debug!(%tier, "coordinate store fix dropped");
        let _ = self.inner.changes.send(tier);
    }

    /// Simulated latency applied to every read
    pub fn set_read_delay(&self, delay: Duration) {
        self.inner
            .read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Script subsequent reads to fail instead of returning a fix
    pub fn set_read_failure(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    // === Consumer surface ===

    /// Read the current coordinates for a tier.
    ///
    /// Completes after the configured simulated latency. `Ok(None)` means
    /// no fix; `Err` means the read itself failed.
    pub async fn read(&self, tier: AccuracyTier) -> Result<Option<Coordinates>, StoreReadFault> {
        let delay_ms = self.inner.read_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreReadFault);
        }
        Ok(self.inner.slots.lock().unwrap()[tier.index()].clone())
    }

    /// Subscribe to tier-change notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AccuracyTier> {
        self.inner.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_read_empty_store() {
        let store = CoordinateStore::new();
        assert_eq!(store.read(AccuracyTier::Low).await, Ok(None));
        assert_eq!(store.read(AccuracyTier::High).await, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_and_read_per_tier() {
        let store = CoordinateStore::new();
        store.set(AccuracyTier::High, Coordinates::tokyo());

        assert_eq!(
            store.read(AccuracyTier::High).await,
            Ok(Some(Coordinates::tokyo()))
        );
        assert_eq!(store.read(AccuracyTier::Low).await, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_fix() {
        let store = CoordinateStore::new();
        store.set_both(Coordinates::paris());
        store.clear(AccuracyTier::Low);

        assert_eq!(store.read(AccuracyTier::Low).await, Ok(None));
        assert_eq!(
            store.read(AccuracyTier::High).await,
            Ok(Some(Coordinates::paris()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_read_failure() {
        let store = CoordinateStore::new();
        store.set_both(Coordinates::berlin());
        store.set_read_failure(true);
        assert_eq!(store.read(AccuracyTier::Low).await, Err(StoreReadFault));

        store.set_read_failure(false);
        assert!(store.read(AccuracyTier::Low).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_notifications() {
        let store = CoordinateStore::new();
        let mut rx = store.subscribe();

        store.set(AccuracyTier::Low, Coordinates::london());
        store.clear(AccuracyTier::High);

        assert_eq!(rx.recv().await.unwrap(), AccuracyTier::Low);
        assert_eq!(rx.recv().await.unwrap(), AccuracyTier::High);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_delay_is_simulated() {
        let store = CoordinateStore::new();
        store.set_both(Coordinates::london());
        store.set_read_delay(Duration::from_millis(500));

        let start = tokio::time::Instant::now();
        let _ = store.read(AccuracyTier::Low).await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[test]
    fn test_handles_share_state() {
        let store = CoordinateStore::new();
        let other = store.clone();
        assert!(store.same_store(&other));
        assert!(!store.same_store(&CoordinateStore::new()));
    }
}
