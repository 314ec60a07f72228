//! Acquisition engine: the position-request state machine.
//!
//! One engine owns one coordinate store, one permission store, one
//! simulated clock, and one per-tier position cache. Every request walks
//! the same protocol:
//!
//! 1. Permission check (with the prompt/request sub-protocol; time spent
//!    here is excluded from the request's timeout budget).
//! 2. Cache lookup keyed by accuracy tier and the maximum-age policy.
//! 3. Fresh acquisition from the store, stamped with the simulated clock
//!    and cached.
//! 4. A timeout race around step 3 only.
//!
//! Collaborator faults never escape: a failed or fixless store read is
//! `POSITION_UNAVAILABLE`, always with an empty message. Terminal outcomes
//! are values, never panics or `Err` at the public boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::cache::PositionCache;
use crate::clock::SimClock;
use crate::permissions::{PermissionState, PermissionStore, GEOLOCATION};
use crate::position::{AccuracyTier, Position, PositionError, PositionOptions, WatchId};
use crate::service::{PositionCallback, PositionErrorCallback, PositionService};
use crate::store::CoordinateStore;
use crate::watch::{self, WatchEntry};

/// Position-acquisition engine over one store/permission/clock triple.
///
/// Cloned handles address the same engine: they share the cache, the watch
/// registry, and the watch-id sequence.
#[derive(Debug, Clone)]
pub struct AcquisitionEngine {
    shared: Arc<EngineShared>,
}

#[derive(Debug)]
pub(crate) struct EngineShared {
    pub(crate) store: CoordinateStore,
    pub(crate) permissions: PermissionStore,
    pub(crate) clock: SimClock,
    cache: Mutex<PositionCache>,
    watches: Mutex<HashMap<WatchId, WatchEntry>>,
    next_watch_id: AtomicU64,
}

impl AcquisitionEngine {
    /// Create an engine over the given collaborators
    #[must_use]
    pub fn new(store: CoordinateStore, permissions: PermissionStore, clock: SimClock) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                store,
                permissions,
                clock,
                cache: Mutex::new(PositionCache::new()),
                watches: Mutex::new(HashMap::new()),
                next_watch_id: AtomicU64::new(0),
            }),
        }
    }

    /// The coordinate store backing this engine
    #[must_use]
    pub fn store(&self) -> &CoordinateStore {
        &self.shared.store
    }

    /// The permission store backing this engine
    #[must_use]
    pub fn permissions(&self) -> &PermissionStore {
        &self.shared.permissions
    }

    /// The simulated clock stamping this engine's positions
    #[must_use]
    pub fn clock(&self) -> &SimClock {
        &self.shared.clock
    }

    /// Whether two handles address the same engine
    #[must_use]
    pub fn same_engine(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Run one acquisition to completion and return its outcome as a value.
    ///
    /// This is the protocol behind `get_current_position`, exposed for
    /// callers that prefer awaiting a tagged result over callbacks.
    pub async fn acquire_once(
        &self,
        options: &PositionOptions,
    ) -> Result<Position, PositionError> {
        EngineShared::acquire(&self.shared, options).await
    }
}

impl EngineShared {
    pub(crate) async fn acquire(
        shared: &Arc<Self>,
        options: &PositionOptions,
    ) -> Result<Position, PositionError> {
        // Step 1: permission. A denied capability resolves without ever
        // starting the timeout timer.
        match shared.permissions.query(GEOLOCATION) {
            PermissionState::Denied => return Err(PositionError::permission_denied()),
            PermissionState::Granted => {}
            PermissionState::Prompt => {
                let decision = shared.permissions.request(GEOLOCATION).await;
                if decision != PermissionState::Granted {
                    return Err(PositionError::permission_denied());
                }
            }
        }

        // Step 2: cache lookup for the requested tier.
        let tier = options.tier();
        let now_ms = shared.clock.now_ms();
        let hit = shared
            .cache
            .lock()
            .unwrap()
            .lookup(tier, options.maximum_age, now_ms);
        if let Some(position) = hit {
            trace!(%tier, timestamp_ms = position.timestamp_ms, "cache hit");
            return Ok(position);
        }

        // Steps 3 and 4: fresh acquisition raced against the timer. The
        // worker is spawned so a lost race detaches it rather than
        // cancelling it; it still completes and fills the cache.
        let mut worker = tokio::spawn(Self::fresh_acquire(Arc::clone(shared), tier));
        match options.timeout {
            None => worker
                .await
                .unwrap_or_else(|_| Err(PositionError::position_unavailable())),
            Some(limit) => {
                tokio::select! {
                    biased;
                    () = tokio::time::sleep(limit) => {
                        trace!(%tier, ?limit, "acquisition timed out");
                        Err(PositionError::timeout())
                    }
                    result = &mut worker => {
                        result.unwrap_or_else(|_| Err(PositionError::position_unavailable()))
                    }
                }
            }
        }
    }

    async fn fresh_acquire(
        shared: Arc<Self>,
        tier: AccuracyTier,
    ) -> Result<Position, PositionError> {
        let coords = match shared.store.read(tier).await {
            Ok(Some(coords)) => coords,
            Ok(None) | Err(_) => return Err(PositionError::position_unavailable()),
        };
        let position = Position::new(coords, shared.clock.now_ms(), tier);
        shared.cache.lock().unwrap().insert(position.clone());
        trace!(%tier, timestamp_ms = position.timestamp_ms, "fresh position acquired");
        Ok(position)
    }
}

impl PositionService for AcquisitionEngine {
    fn get_current_position(
        &self,
        on_success: PositionCallback,
        on_error: Option<PositionErrorCallback>,
        options: PositionOptions,
    ) {
        let shared = Arc::clone(&self.shared);
        let _ = tokio::spawn(async move {
            let outcome = EngineShared::acquire(&shared, &options).await;
            let mut on_success = on_success;
            let mut on_error = on_error;
            match outcome {
                Ok(position) => on_success(position),
                Err(error) => {
                    if let Some(callback) = on_error.as_mut() {
                        callback(error);
                    }
                }
            }
        });
    }

    fn watch_position(
        &self,
        on_success: PositionCallback,
        on_error: Option<PositionErrorCallback>,
        options: PositionOptions,
    ) -> WatchId {
        let id = WatchId(self.shared.next_watch_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        let cleared = Arc::new(AtomicBool::new(false));

        let _ = watch::spawn_delivery(rx, on_success, on_error, Arc::clone(&cleared));
        let driver = watch::spawn_driver(Arc::clone(&self.shared), id, options, tx);

        self.shared
            .watches
            .lock()
            .unwrap()
            .insert(id, WatchEntry::new(cleared, driver));
        debug!(watch = %id, "watch registered");
        id
    }

    fn clear_watch(&self, id: WatchId) {
        let entry = self.shared.watches.lock().unwrap().remove(&id);
        if let Some(entry) = entry {
            entry.clear();
            debug!(watch = %id, "watch cleared");
        }
    }
}
