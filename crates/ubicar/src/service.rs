//! The public position-service surface.
//!
//! Implemented by [`crate::engine::AcquisitionEngine`] and
//! [`crate::router::DelegationRouter`], and consumed by the observer layer,
//! which is deliberately blind to which of the two backs it.
//!
//! Delivery is never synchronous: no callback runs before the public call
//! returns and control reaches the scheduler. Exactly one of the success or
//! error callbacks fires per terminal outcome, never both. A caller that
//! omits the error callback simply receives no error notifications.

use crate::position::{Position, PositionError, PositionOptions, WatchId};

/// Success callback for position deliveries
pub type PositionCallback = Box<dyn FnMut(Position) + Send>;

/// Error callback for position-error deliveries
pub type PositionErrorCallback = Box<dyn FnMut(PositionError) + Send>;

/// Watch-capable position service.
///
/// All methods must be called from within a tokio runtime; outcomes are
/// produced on spawned tasks.
pub trait PositionService: Send + Sync {
    /// One-shot position request. Fire and forget; the outcome arrives on
    /// exactly one of the callbacks, on a scheduled task.
    fn get_current_position(
        &self,
        on_success: PositionCallback,
        on_error: Option<PositionErrorCallback>,
        options: PositionOptions,
    );

    /// Establish a recurring watch. The returned id stays valid until
    /// cleared, across delegate switches included.
    fn watch_position(
        &self,
        on_success: PositionCallback,
        on_error: Option<PositionErrorCallback>,
        options: PositionOptions,
    ) -> WatchId;

    /// Tear down a watch. Synchronous: no delivery for this watch is
    /// observable after the call returns. Idempotent; unknown ids are a
    /// no-op.
    fn clear_watch(&self, id: WatchId);
}
