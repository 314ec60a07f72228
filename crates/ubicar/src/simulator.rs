//! Facade wiring a complete simulation together.
//!
//! [`GeolocationSimulator`] assembles a clock, a coordinate store, a
//! permission store, an engine, and an observer, and exposes the verbs a
//! test script actually uses: move the world, move time, flip permissions.
//! Tests that need finer control reach through the accessors and drive the
//! collaborators directly.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::clock::SimClock;
use crate::engine::AcquisitionEngine;
use crate::observer::GeolocationObserver;
use crate::permissions::{PermissionState, PermissionStore, RequestHandler, GEOLOCATION};
use crate::position::{AccuracyTier, Coordinates};
use crate::store::CoordinateStore;

/// Configuration for a simulator
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Ground truth installed on both tiers at startup (`None` = no fix)
    pub initial_coordinates: Option<Coordinates>,
    /// Permission state of the position capability at startup
    pub initial_permission: PermissionState,
    /// Simulated latency of every coordinate read
    pub read_delay: Duration,
    /// Simulated clock value at startup, in milliseconds
    pub start_time_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            initial_coordinates: None,
            initial_permission: PermissionState::Prompt,
            read_delay: Duration::ZERO,
            start_time_ms: 0,
        }
    }
}

impl SimulatorConfig {
    /// Configuration with platform defaults: no fix, `Prompt`, instant reads
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install ground truth on both tiers at startup
    #[must_use]
    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.initial_coordinates = Some(coordinates);
        self
    }

    /// Start with the given permission state
    #[must_use]
    pub const fn with_permission(mut self, state: PermissionState) -> Self {
        self.initial_permission = state;
        self
    }

    /// Apply a simulated latency to every coordinate read
    #[must_use]
    pub const fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Start the simulated clock at the given millisecond value
    #[must_use]
    pub const fn with_start_time_ms(mut self, ms: u64) -> Self {
        self.start_time_ms = ms;
        self
    }
}

/// Assembled simulation: one engine over scriptable collaborators
#[derive(Debug, Clone)]
pub struct GeolocationSimulator {
    clock: SimClock,
    store: CoordinateStore,
    permissions: PermissionStore,
    engine: AcquisitionEngine,
}

impl Default for GeolocationSimulator {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl GeolocationSimulator {
    /// Build a simulator from a configuration
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        let clock = SimClock::starting_at(config.start_time_ms);
        let store = CoordinateStore::new();
        let permissions = PermissionStore::new();

        if let Some(coordinates) = config.initial_coordinates {
            store.set_both(coordinates);
        }
        store.set_read_delay(config.read_delay);
        permissions.set(GEOLOCATION, config.initial_permission);

        let engine = AcquisitionEngine::new(store.clone(), permissions.clone(), clock.clone());
        info!(permission = %config.initial_permission, "geolocation simulation assembled");
        Self {
            clock,
            store,
            permissions,
            engine,
        }
    }

    /// The engine under test
    #[must_use]
    pub fn engine(&self) -> &AcquisitionEngine {
        &self.engine
    }

    /// Observer over this simulator's engine and permission store
    #[must_use]
    pub fn observer(&self) -> GeolocationObserver {
        GeolocationObserver::new(Arc::new(self.engine.clone()), self.permissions.clone())
    }

    /// The simulated clock
    #[must_use]
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// The coordinate store
    #[must_use]
    pub fn store(&self) -> &CoordinateStore {
        &self.store
    }

    /// The permission store
    #[must_use]
    pub fn permissions(&self) -> &PermissionStore {
        &self.permissions
    }

    // === Scripting verbs ===

    /// Move the ground truth of both tiers
    pub fn jump_to_coordinates(&self, coordinates: Coordinates) {
        self.store.set_both(coordinates);
    }

    /// Move the ground truth of one tier
    pub fn jump_tier_to(&self, tier: AccuracyTier, coordinates: Coordinates) {
        self.store.set(tier, coordinates);
    }

    /// Drop the fix on both tiers
    pub fn lose_fix(&self) {
        self.store.clear(AccuracyTier::Low);
        self.store.clear(AccuracyTier::High);
    }

    /// Set the position capability's permission state
    pub fn set_permission(&self, state: PermissionState) {
        self.permissions.set(GEOLOCATION, state);
    }

    /// Grant the position capability
    pub fn grant_permission(&self) {
        self.set_permission(PermissionState::Granted);
    }

    /// Deny the position capability
    pub fn deny_permission(&self) {
        self.set_permission(PermissionState::Denied);
    }

    /// Register the handler deciding prompt-state permission requests
    pub fn on_permission_request(&self, handler: RequestHandler) {
        self.permissions.register_request_handler(handler);
    }

    /// Advance the simulated clock
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Set the simulated clock, rewinding if needed
    pub fn set_time_ms(&self, ms: u64) {
        self.clock.set_ms(ms);
    }
}
