//! Access-permission store and request protocol.
//!
//! Tracks a permission state per capability name, broadcasts transitions,
//! and runs the request sub-protocol: when a request arrives in the
//! `Prompt` state, a registered decision handler (sync or arbitrarily
//! delayed) supplies the outcome. Without a handler, requesting from
//! `Prompt` resolves to `Denied` without touching the stored state.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Capability name for position access
pub const GEOLOCATION: &str = "geolocation";

/// Access state of one capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionState {
    /// Not yet decided; a request may prompt for a decision
    Prompt,
    /// Access granted
    Granted,
    /// Access denied
    Denied,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prompt => write!(f, "prompt"),
            Self::Granted => write!(f, "granted"),
            Self::Denied => write!(f, "denied"),
        }
    }
}

/// A permission transition broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionChange {
    /// Capability whose state changed
    pub capability: String,
    /// New state
    pub state: PermissionState,
}

/// Decision handler invoked when a capability is requested from `Prompt`.
///
/// May resolve immediately or after any number of scheduled steps.
pub type RequestHandler =
    Box<dyn Fn(&str) -> BoxFuture<'static, PermissionState> + Send + Sync>;

/// Shared per-capability permission store
#[derive(Clone)]
pub struct PermissionStore {
    inner: Arc<PermissionInner>,
}

struct PermissionInner {
    states: Mutex<HashMap<String, PermissionState>>,
    changes: broadcast::Sender<PermissionChange>,
    handler: Mutex<Option<RequestHandler>>,
}

impl fmt::Debug for PermissionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionStore")
            .field("states", &self.inner.states.lock().unwrap())
            .finish_non_exhaustive()
    }
}

impl Default for PermissionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionStore {
    /// Create a store where every capability starts at `Prompt`
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(PermissionInner {
                states: Mutex::new(HashMap::new()),
                changes,
                handler: Mutex::new(None),
            }),
        }
    }

    /// Whether two handles address the same underlying store
    #[must_use]
    pub fn same_store(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current state for a capability; unknown capabilities are `Prompt`
    #[must_use]
    pub fn query(&self, capability: &str) -> PermissionState {
        self.inner
            .states
            .lock()
            .unwrap()
            .get(capability)
            .copied()
            .unwrap_or(PermissionState::Prompt)
    }

    /// Set a capability's state, broadcasting on an actual transition
    pub fn set(&self, capability: &str, state: PermissionState) {
        let previous = self
            .inner
            .states
            .lock()
            .unwrap()
            .insert(capability.to_string(), state);
        if previous != Some(state) {
            debug!(capability, %state, "permission transition");
            let _ = self.inner.changes.send(PermissionChange {
                capability: capability.to_string(),
                state,
            });
        }
    }

    /// Subscribe to state transitions across all capabilities
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PermissionChange> {
        self.inner.changes.subscribe()
    }

    /// Register the decision handler consulted by [`PermissionStore::request`]
    pub fn register_request_handler(&self, handler: RequestHandler) {
        *self.inner.handler.lock().unwrap() = Some(handler);
    }

    /// Remove the decision handler, if any
    pub fn clear_request_handler(&self) {
        *self.inner.handler.lock().unwrap() = None;
    }

    /// Request access to a capability.
    ///
    /// Outside `Prompt` the current state is returned unchanged. In
    /// `Prompt`, a registered handler decides; its decision is stored and
    /// broadcast. With no handler the request resolves to `Denied` and the
    /// stored state stays `Prompt`.
    pub async fn request(&self, capability: &str) -> PermissionState {
        match self.query(capability) {
            PermissionState::Prompt => {}
            decided => return decided,
        }

        // The handler future must not be awaited while the lock is held.
        let decision_future = self
            .inner
            .handler
            .lock()
            .unwrap()
            .as_ref()
            .map(|handler| handler(capability));

        match decision_future {
            None => PermissionState::Denied,
            Some(future) => {
                let decision = future.await;
                self.set(capability, decision);
                decision
            }
        }
    }
}
