//! Watch lifecycle: driver and delivery tasks.
//!
//! Each watch runs two tasks. The *driver* owns the acquisition protocol:
//! it performs the initial attempt, then re-runs it whenever the relevant
//! tier's ground truth changes or the position capability's permission
//! state transitions. The *delivery* task owns the caller's callback pair
//! and drains a FIFO channel, which is what makes deliveries strictly
//! ordered and never synchronous with any public call.
//!
//! Clearing sets a flag checked immediately before each callback
//! invocation and aborts the driver, so an acquisition in flight at clear
//! time completes (or is dropped) without being observed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::engine::EngineShared;
use crate::permissions::{PermissionState, GEOLOCATION};
use crate::position::{Position, PositionError, PositionErrorCode, PositionOptions, WatchId};
use crate::service::{PositionCallback, PositionErrorCallback};

/// One terminal outcome queued for a watch
pub(crate) type Delivery = Result<Position, PositionError>;

/// Lifecycle of an active watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchState {
    AwaitingPermission,
    Acquiring,
    Delivered,
    Denied,
    Unavailable,
    TimedOut,
}

impl WatchState {
    fn after(outcome: &Delivery) -> Self {
        match outcome {
            Ok(_) => Self::Delivered,
            Err(error) => match error.code {
                PositionErrorCode::PermissionDenied => Self::Denied,
                PositionErrorCode::PositionUnavailable => Self::Unavailable,
                PositionErrorCode::Timeout => Self::TimedOut,
            },
        }
    }
}

/// Registry entry for an active watch
#[derive(Debug)]
pub(crate) struct WatchEntry {
    cleared: Arc<AtomicBool>,
    driver: JoinHandle<()>,
}

impl WatchEntry {
    pub(crate) fn new(cleared: Arc<AtomicBool>, driver: JoinHandle<()>) -> Self {
        Self { cleared, driver }
    }

    /// Suppress all further deliveries and stop the driver
    pub(crate) fn clear(&self) {
        self.cleared.store(true, Ordering::SeqCst);
        self.driver.abort();
    }
}

/// Spawn the task that owns the callback pair and drains deliveries in order
pub(crate) fn spawn_delivery(
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    mut on_success: PositionCallback,
    mut on_error: Option<PositionErrorCallback>,
    cleared: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(outcome) = rx.recv().await {
            if cleared.load(Ordering::SeqCst) {
                break;
            }
            match outcome {
                Ok(position) => on_success(position),
                Err(error) => {
                    if let Some(callback) = on_error.as_mut() {
                        callback(error);
                    }
                }
            }
        }
    })
}

/// Spawn the driver for a recurring watch
pub(crate) fn spawn_driver(
    shared: Arc<EngineShared>,
    id: WatchId,
    options: PositionOptions,
    tx: mpsc::UnboundedSender<Delivery>,
) -> JoinHandle<()> {
    tokio::spawn(drive(shared, id, options, tx))
}

async fn drive(
    shared: Arc<EngineShared>,
    id: WatchId,
    options: PositionOptions,
    tx: mpsc::UnboundedSender<Delivery>,
) {
    let tier = options.tier();
    trace!(watch = %id, state = ?WatchState::AwaitingPermission, "watch established");

    // Subscribe before the initial attempt so no transition is missed.
    let mut coord_rx = shared.store.subscribe();
    let mut perm_rx = shared.permissions.subscribe();

    let Some(mut state) = attempt(&shared, id, &options, &tx).await else {
        return;
    };

    loop {
        let rearm = tokio::select! {
            changed = coord_rx.recv() => match changed {
                Ok(changed_tier) if changed_tier == tier => {
                    // Ground truth moved; only a granted watch reacts.
                    shared.permissions.query(GEOLOCATION) == PermissionState::Granted
                }
                Ok(_) => false,
                Err(RecvError::Lagged(missed)) => {
                    trace!(watch = %id, missed, "coordinate notifications lagged");
                    shared.permissions.query(GEOLOCATION) == PermissionState::Granted
                }
                Err(RecvError::Closed) => return,
            },
            changed = perm_rx.recv() => match changed {
                Ok(change) if change.capability == GEOLOCATION => {
                    // A slide into Denied is delivered once, then the watch
                    // idles until the state moves away from Denied again.
                    !(change.state == PermissionState::Denied && state == WatchState::Denied)
                }
                Ok(_) => false,
                Err(RecvError::Lagged(missed)) => {
                    trace!(watch = %id, missed, "permission notifications lagged");
                    !(shared.permissions.query(GEOLOCATION) == PermissionState::Denied
                        && state == WatchState::Denied)
                }
                Err(RecvError::Closed) => return,
            },
        };

        if rearm {
            match attempt(&shared, id, &options, &tx).await {
                Some(next) => state = next,
                None => return,
            }
        }
    }
}

/// Run one acquisition attempt and queue its outcome.
///
/// Returns the resulting state, or `None` when the delivery side is gone
/// and the driver should stop.
async fn attempt(
    shared: &Arc<EngineShared>,
    id: WatchId,
    options: &PositionOptions,
    tx: &mpsc::UnboundedSender<Delivery>,
) -> Option<WatchState> {
    trace!(watch = %id, state = ?WatchState::Acquiring, "watch attempt");
    let outcome = EngineShared::acquire(shared, options).await;
    let next = WatchState::after(&outcome);
    tx.send(outcome).ok()?;
    trace!(watch = %id, state = ?next, "watch outcome queued");
    Some(next)
}
