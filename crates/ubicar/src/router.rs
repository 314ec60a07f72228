//! Delegation router: one watch-capable handle over swappable engines.
//!
//! The router fronts a fixed registry of independently permissioned
//! acquisition engines. Requests always hit the delegate selected at call
//! time. Switching the selection migrates every live watch to the new
//! delegate while its caller-visible id stays the same: each watch routes
//! deliveries through an indirection channel owned by the router, so a
//! switch just tears down the inner subscription and re-establishes it on
//! the other side of the channel.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::AcquisitionEngine;
use crate::permissions::PermissionStore;
use crate::position::{PositionOptions, WatchId};
use crate::result::{UbicarError, UbicarResult};
use crate::service::{PositionCallback, PositionErrorCallback, PositionService};
use crate::watch::{self, Delivery};

/// Listener invoked after a delegate selection change
pub type SelectionListener = Box<dyn Fn(&AcquisitionEngine) + Send>;

/// Router over a registry of acquisition engines
#[derive(Clone)]
pub struct DelegationRouter {
    shared: Arc<RouterShared>,
}

struct RouterShared {
    delegates: Vec<Delegate>,
    selected: Mutex<usize>,
    watches: Mutex<HashMap<WatchId, RouterWatch>>,
    next_watch_id: AtomicU64,
    listeners: Mutex<Vec<SelectionListener>>,
}

struct Delegate {
    engine: AcquisitionEngine,
    permissions: PermissionStore,
}

struct RouterWatch {
    options: PositionOptions,
    tx: mpsc::UnboundedSender<Delivery>,
    cleared: Arc<AtomicBool>,
    delegate_index: usize,
    inner_id: WatchId,
}

impl std::fmt::Debug for DelegationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationRouter")
            .field("delegates", &self.shared.delegates.len())
            .field("selected", &*self.shared.selected.lock().unwrap())
            .finish_non_exhaustive()
    }
}

impl DelegationRouter {
    /// Build a router over `delegates`, pairing each with its permission
    /// store from `permission_map` by engine identity.
    ///
    /// Fails with [`UbicarError::NoDelegates`] on an empty registry and
    /// [`UbicarError::MissingPermissionStore`] when a delegate has no pair
    /// in the map. The first delegate starts selected.
    pub fn new(
        delegates: Vec<AcquisitionEngine>,
        permission_map: &[(AcquisitionEngine, PermissionStore)],
    ) -> UbicarResult<Self> {
        if delegates.is_empty() {
            return Err(UbicarError::NoDelegates);
        }

        let delegates = delegates
            .into_iter()
            .enumerate()
            .map(|(index, engine)| {
                let permissions = permission_map
                    .iter()
                    .find(|(candidate, _)| candidate.same_engine(&engine))
                    .map(|(_, store)| store.clone())
                    .ok_or(UbicarError::MissingPermissionStore { index })?;
                Ok(Delegate {
                    engine,
                    permissions,
                })
            })
            .collect::<UbicarResult<Vec<_>>>()?;

        Ok(Self {
            shared: Arc::new(RouterShared {
                delegates,
                selected: Mutex::new(0),
                watches: Mutex::new(HashMap::new()),
                next_watch_id: AtomicU64::new(0),
                listeners: Mutex::new(Vec::new()),
            }),
        })
    }

    /// The currently selected delegate
    #[must_use]
    pub fn selected_delegate(&self) -> AcquisitionEngine {
        let index = *self.shared.selected.lock().unwrap();
        self.shared.delegates[index].engine.clone()
    }

    /// Whether `delegate` is the currently selected one
    #[must_use]
    pub fn is_selected_delegate(&self, delegate: &AcquisitionEngine) -> bool {
        self.selected_delegate().same_engine(delegate)
    }

    /// Permission store paired with a registered delegate
    pub fn permissions_for(&self, delegate: &AcquisitionEngine) -> UbicarResult<PermissionStore> {
        self.shared
            .delegates
            .iter()
            .find(|d| d.engine.same_engine(delegate))
            .map(|d| d.permissions.clone())
            .ok_or(UbicarError::UnknownDelegate)
    }

    /// Register a listener for selection changes.
    ///
    /// A panicking listener is contained and logged; it cannot block other
    /// listeners or the switch itself.
    pub fn on_select(&self, listener: SelectionListener) {
        self.shared.listeners.lock().unwrap().push(listener);
    }

    /// Make `delegate` live and migrate every active watch onto it.
    ///
    /// Watch ids are untouched: a caller holding an id from before the
    /// switch keeps using it, including to clear. Deliveries already
    /// scheduled under the previous delegate may still arrive.
    pub fn select_delegate(&self, delegate: &AcquisitionEngine) -> UbicarResult<()> {
        let index = self
            .shared
            .delegates
            .iter()
            .position(|d| d.engine.same_engine(delegate))
            .ok_or(UbicarError::UnknownDelegate)?;

        {
            let mut selected = self.shared.selected.lock().unwrap();
            if *selected == index {
                return Ok(());
            }
            *selected = index;

            let mut watches = self.shared.watches.lock().unwrap();
            for (id, entry) in watches.iter_mut() {
                let previous = &self.shared.delegates[entry.delegate_index].engine;
                previous.clear_watch(entry.inner_id);

                let next = &self.shared.delegates[index].engine;
                entry.inner_id = subscribe_inner(next, &entry.tx, entry.options.clone());
                entry.delegate_index = index;
                debug!(watch = %id, delegate = index, "watch migrated");
            }
        }
        debug!(delegate = index, "delegate selected");

        let engine = self.shared.delegates[index].engine.clone();
        for listener in self.shared.listeners.lock().unwrap().iter() {
            if catch_unwind(AssertUnwindSafe(|| listener(&engine))).is_err() {
                warn!(delegate = index, "selection listener panicked");
            }
        }
        Ok(())
    }
}

/// Subscribe on a delegate, forwarding both channels into the router's
/// per-watch indirection channel.
fn subscribe_inner(
    engine: &AcquisitionEngine,
    tx: &mpsc::UnboundedSender<Delivery>,
    options: PositionOptions,
) -> WatchId {
    let success_tx = tx.clone();
    let error_tx = tx.clone();
    engine.watch_position(
        Box::new(move |position| {
            let _ = success_tx.send(Ok(position));
        }),
        Some(Box::new(move |error| {
            let _ = error_tx.send(Err(error));
        })),
        options,
    )
}

impl PositionService for DelegationRouter {
    fn get_current_position(
        &self,
        on_success: PositionCallback,
        on_error: Option<PositionErrorCallback>,
        options: PositionOptions,
    ) {
        self.selected_delegate()
            .get_current_position(on_success, on_error, options);
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

        // Lock order matches select_delegate: selection, then the registry,
        // so a switch can never interleave with registration.
        let selected = self.shared.selected.lock().unwrap();
        let delegate_index = *selected;
        let inner_id = subscribe_inner(
            &self.shared.delegates[delegate_index].engine,
            &tx,
            options.clone(),
        );
        self.shared.watches.lock().unwrap().insert(
            id,
            RouterWatch {
                options,
                tx,
                cleared,
                delegate_index,
                inner_id,
            },
        );
        drop(selected);
        debug!(watch = %id, delegate = delegate_index, "routed watch registered");
        id
    }

    fn clear_watch(&self, id: WatchId) {
        let entry = self.shared.watches.lock().unwrap().remove(&id);
        if let Some(entry) = entry {
            entry.cleared.store(true, Ordering::SeqCst);
            self.shared.delegates[entry.delegate_index]
                .engine
                .clear_watch(entry.inner_id);
            debug!(watch = %id, "routed watch cleared");
        }
    }
}
