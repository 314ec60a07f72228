//! Awaitable observation of positions, errors, and permission states.
//!
//! The observer is a pure consumer of the public watch surface: it sees
//! exactly what any other caller of `watch_position` would see, which is
//! what makes it safe to use against an engine and a router alike. Each
//! wait establishes one internal watch, resolves on the first delivery
//! matching the caller's predicates, and clears that watch exactly once
//! before resolving.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::permissions::{PermissionState, PermissionStore, GEOLOCATION};
use crate::position::{Coordinates, Position, PositionError, PositionErrorCode, PositionOptions};
use crate::result::{UbicarError, UbicarResult};
use crate::service::PositionService;

// =============================================================================
// COORDINATES MATCHER
// =============================================================================

/// Partial-field predicate over [`Coordinates`].
///
/// Only fields that are set participate in matching. For the optional
/// coordinate fields, `Some(None)` demands the field be absent, while
/// `Some(Some(v))` demands it equal `v`. `NaN` matches `NaN`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinatesMatcher {
    /// Required latitude, if any
    pub latitude: Option<f64>,
    /// Required longitude, if any
    pub longitude: Option<f64>,
    /// Required accuracy, if any
    pub accuracy: Option<f64>,
    /// Required altitude (`Some(None)` = must be absent)
    pub altitude: Option<Option<f64>>,
    /// Required altitude accuracy (`Some(None)` = must be absent)
    pub altitude_accuracy: Option<Option<f64>>,
    /// Required heading (`Some(None)` = must be absent)
    pub heading: Option<Option<f64>>,
    /// Required speed (`Some(None)` = must be absent)
    pub speed: Option<Option<f64>>,
}

impl CoordinatesMatcher {
    /// Matcher with no constraints; matches any coordinates
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Matcher pinning every field of `coords`
    #[must_use]
    pub fn for_coordinates(coords: &Coordinates) -> Self {
        Self {
            latitude: Some(coords.latitude),
            longitude: Some(coords.longitude),
            accuracy: Some(coords.accuracy),
            altitude: Some(coords.altitude),
            altitude_accuracy: Some(coords.altitude_accuracy),
            heading: Some(coords.heading),
            speed: Some(coords.speed),
        }
    }

    /// Require a latitude
    #[must_use]
    pub const fn with_latitude(mut self, latitude: f64) -> Self {
        self.latitude = Some(latitude);
        self
    }

    /// Require a longitude
    #[must_use]
    pub const fn with_longitude(mut self, longitude: f64) -> Self {
        self.longitude = Some(longitude);
        self
    }

    /// Require an accuracy
    #[must_use]
    pub const fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Require an altitude value, or its absence with `None`
    #[must_use]
    pub const fn with_altitude(mut self, altitude: Option<f64>) -> Self {
        self.altitude = Some(altitude);
        self
    }

    /// Require a heading value, or its absence with `None`
    #[must_use]
    pub const fn with_heading(mut self, heading: Option<f64>) -> Self {
        self.heading = Some(heading);
        self
    }

    /// Require a speed value, or its absence with `None`
    #[must_use]
    pub const fn with_speed(mut self, speed: Option<f64>) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Whether `coords` satisfies every constraint set on this matcher
    #[must_use]
    pub fn matches(&self, coords: &Coordinates) -> bool {
        let required = [
            (self.latitude, coords.latitude),
            (self.longitude, coords.longitude),
            (self.accuracy, coords.accuracy),
        ];
        if !required
            .iter()
            .all(|&(expected, actual)| expected.map_or(true, |e| value_eq(e, actual)))
        {
            return false;
        }

        let optional = [
            (self.altitude, coords.altitude),
            (self.altitude_accuracy, coords.altitude_accuracy),
            (self.heading, coords.heading),
            (self.speed, coords.speed),
        ];
        optional
            .iter()
            .all(|&(expected, actual)| expected.map_or(true, |e| optional_eq(e, actual)))
    }
}

/// Strict equality extended so `NaN` equals `NaN`
fn value_eq(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Option equality where absence only matches absence
fn optional_eq(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => value_eq(a, b),
        _ => false,
    }
}

/// Whether any matcher in the set accepts the coordinates. An empty set
/// accepts everything.
fn any_matches(matchers: &[CoordinatesMatcher], coords: &Coordinates) -> bool {
    matchers.is_empty() || matchers.iter().any(|m| m.matches(coords))
}

// =============================================================================
// OBSERVER
// =============================================================================

/// Awaitable observer over a position service and its permission store
pub struct GeolocationObserver {
    service: Arc<dyn PositionService>,
    permissions: PermissionStore,
}

impl std::fmt::Debug for GeolocationObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeolocationObserver").finish_non_exhaustive()
    }
}

/// Clears the observer's internal watch exactly once, whether the wait
/// resolves or is dropped early.
struct WatchGuard<'a> {
    service: &'a dyn PositionService,
    id: crate::position::WatchId,
    cleared: bool,
}

impl WatchGuard<'_> {
    fn clear(&mut self) {
        if !self.cleared {
            self.cleared = true;
            self.service.clear_watch(self.id);
        }
    }
}

impl Drop for WatchGuard<'_> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl GeolocationObserver {
    /// Observe `service`, using `permissions` for permission-state waits
    #[must_use]
    pub fn new(service: Arc<dyn PositionService>, permissions: PermissionStore) -> Self {
        Self {
            service,
            permissions,
        }
    }

    /// Resolve on the first delivered position whose coordinates satisfy at
    /// least one matcher. An empty matcher set matches the first delivery.
    ///
    /// The wait has no deadline of its own; callers wanting one race this
    /// future against their own timer.
    pub async fn wait_for_coordinates(
        &self,
        matchers: &[CoordinatesMatcher],
        options: PositionOptions,
    ) -> UbicarResult<Position> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = self.service.watch_position(
            Box::new(move |position| {
                let _ = tx.send(position);
            }),
            None,
            options,
        );
        let mut guard = WatchGuard {
            service: self.service.as_ref(),
            id,
            cleared: false,
        };

        while let Some(position) = rx.recv().await {
            if any_matches(matchers, &position.coords) {
                guard.clear();
                return Ok(position);
            }
        }
        Err(UbicarError::WatchTerminated)
    }

    /// [`GeolocationObserver::wait_for_coordinates`] with a concurrent task
    /// whose failure propagates
    pub async fn wait_for_coordinates_with<T>(
        &self,
        matchers: &[CoordinatesMatcher],
        task: impl Future<Output = UbicarResult<T>>,
        options: PositionOptions,
    ) -> UbicarResult<(Position, T)> {
        tokio::try_join!(self.wait_for_coordinates(matchers, options), task)
    }

    /// Resolve on the first delivered position error whose code is in the
    /// given set. An empty set matches the first error.
    pub async fn wait_for_position_error(
        &self,
        codes: &[PositionErrorCode],
        options: PositionOptions,
    ) -> UbicarResult<PositionError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = self.service.watch_position(
            Box::new(|_| {}),
            Some(Box::new(move |error| {
                let _ = tx.send(error);
            })),
            options,
        );
        let mut guard = WatchGuard {
            service: self.service.as_ref(),
            id,
            cleared: false,
        };

        while let Some(error) = rx.recv().await {
            if codes.is_empty() || codes.contains(&error.code) {
                guard.clear();
                return Ok(error);
            }
        }
        Err(UbicarError::WatchTerminated)
    }

    /// [`GeolocationObserver::wait_for_position_error`] with a concurrent
    /// task whose failure propagates
    pub async fn wait_for_position_error_with<T>(
        &self,
        codes: &[PositionErrorCode],
        task: impl Future<Output = UbicarResult<T>>,
        options: PositionOptions,
    ) -> UbicarResult<(PositionError, T)> {
        tokio::try_join!(self.wait_for_position_error(codes, options), task)
    }

    /// Resolve once the position capability is in one of the given states.
    ///
    /// Resolves immediately when the current state already matches. An
    /// empty state set is a configuration error.
    pub async fn wait_for_permission_state(
        &self,
        states: &[PermissionState],
    ) -> UbicarResult<PermissionState> {
        if states.is_empty() {
            return Err(UbicarError::EmptyStateSet);
        }

        // Subscribe first so a transition between query and recv is caught.
        let mut rx = self.permissions.subscribe();
        let current = self.permissions.query(GEOLOCATION);
        if states.contains(&current) {
            return Ok(current);
        }

        loop {
            match rx.recv().await {
                Ok(change) => {
                    if change.capability == GEOLOCATION && states.contains(&change.state) {
                        return Ok(change.state);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    let state = self.permissions.query(GEOLOCATION);
                    if states.contains(&state) {
                        return Ok(state);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    return Err(UbicarError::WatchTerminated);
                }
            }
        }
    }

    /// [`GeolocationObserver::wait_for_permission_state`] with a concurrent
    /// task whose failure propagates
    pub async fn wait_for_permission_state_with<T>(
        &self,
        states: &[PermissionState],
        task: impl Future<Output = UbicarResult<T>>,
    ) -> UbicarResult<(PermissionState, T)> {
        tokio::try_join!(self.wait_for_permission_state(states), task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClock;
    use crate::engine::AcquisitionEngine;
    use crate::store::CoordinateStore;

    fn observed_engine() -> (AcquisitionEngine, GeolocationObserver) {
        let permissions = PermissionStore::new();
        permissions.set(GEOLOCATION, PermissionState::Granted);
        let engine = AcquisitionEngine::new(
            CoordinateStore::new(),
            permissions.clone(),
            SimClock::new(),
        );
        let observer = GeolocationObserver::new(Arc::new(engine.clone()), permissions);
        (engine, observer)
    }

    // === Matcher semantics ===

    #[test]
    fn test_empty_matcher_matches_anything() {
        let m = CoordinatesMatcher::any();
        assert!(m.matches(&Coordinates::london()));
        assert!(m.matches(&Coordinates::tokyo().with_speed(3.0)));
    }

    #[test]
    fn test_matcher_partial_fields() {
        let m = CoordinatesMatcher::any().with_latitude(51.508039);
        assert!(m.matches(&Coordinates::london()));
        assert!(!m.matches(&Coordinates::tokyo()));
    }

    #[test]
    fn test_matcher_nan_equals_nan() {
        let coords = Coordinates::new(0.0, 0.0, 10.0).with_heading(f64::NAN);
        let m = CoordinatesMatcher::any().with_heading(Some(f64::NAN));
        assert!(m.matches(&coords));
    }

    #[test]
    fn test_matcher_absence_only_matches_absence() {
        let without_altitude = Coordinates::new(0.0, 0.0, 10.0);
        let with_altitude = Coordinates::new(0.0, 0.0, 10.0).with_altitude(50.0, 5.0);

        let m = CoordinatesMatcher::any().with_altitude(None);
        assert!(m.matches(&without_altitude));
        assert!(!m.matches(&with_altitude));

        let m = CoordinatesMatcher::any().with_altitude(Some(50.0));
        assert!(!m.matches(&without_altitude));
        assert!(m.matches(&with_altitude));
    }

    #[test]
    fn test_full_matcher_round_trip() {
        let coords = Coordinates::berlin().with_heading(270.0).with_speed(12.5);
        assert!(CoordinatesMatcher::for_coordinates(&coords).matches(&coords));
        assert!(!CoordinatesMatcher::for_coordinates(&coords).matches(&Coordinates::berlin()));
    }

    #[test]
    fn test_matcher_set_is_a_disjunction() {
        let matchers = [
            CoordinatesMatcher::for_coordinates(&Coordinates::london()),
            CoordinatesMatcher::for_coordinates(&Coordinates::tokyo()),
        ];
        assert!(any_matches(&matchers, &Coordinates::tokyo()));
        assert!(!any_matches(&matchers, &Coordinates::berlin()));
        assert!(any_matches(&[], &Coordinates::berlin()));
    }

    // === wait_for_coordinates ===

    #[tokio::test(start_paused = true)]
    async fn test_wait_resolves_on_first_delivery_with_no_matchers() {
        let (engine, observer) = observed_engine();
        engine.store().set_both(Coordinates::london());

        let position = observer
            .wait_for_coordinates(&[], PositionOptions::new())
            .await
            .unwrap();
        assert_eq!(position.coords, Coordinates::london());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_skips_non_matching_deliveries() {
        let (engine, observer) = observed_engine();
        engine.store().set_both(Coordinates::london());

        let target = [CoordinatesMatcher::for_coordinates(&Coordinates::paris())];
        let position = observer
            .wait_for_coordinates_with(&target, async {
                engine.store().set_both(Coordinates::paris());
                Ok(())
            }, PositionOptions::new())
            .await
            .unwrap()
            .0;
        assert_eq!(position.coords, Coordinates::paris());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_task_failure_propagates() {
        let (engine, observer) = observed_engine();
        engine.store().set_both(Coordinates::london());

        let never = [CoordinatesMatcher::for_coordinates(&Coordinates::sydney())];
        let result: UbicarResult<(Position, ())> = observer
            .wait_for_coordinates_with(&never, async { Err(UbicarError::WatchTerminated) },
                PositionOptions::new())
            .await;
        assert!(result.is_err());
    }

    // === wait_for_position_error ===

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_error_by_code() {
        let (engine, observer) = observed_engine();
        // Granted but no fix: every attempt is POSITION_UNAVAILABLE.
        let error = observer
            .wait_for_position_error(
                &[PositionErrorCode::PositionUnavailable],
                PositionOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(error.code, PositionErrorCode::PositionUnavailable);
        assert_eq!(error.message, "");
        let _ = engine;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_error_empty_set_matches_any() {
        let (engine, observer) = observed_engine();
        engine
            .permissions()
            .set(GEOLOCATION, PermissionState::Denied);

        let error = observer
            .wait_for_position_error(&[], PositionOptions::new())
            .await
            .unwrap();
        assert_eq!(error.code, PositionErrorCode::PermissionDenied);
    }

    // === wait_for_permission_state ===

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_permission_state_empty_set_is_config_error() {
        let (_engine, observer) = observed_engine();
        assert!(matches!(
            observer.wait_for_permission_state(&[]).await,
            Err(UbicarError::EmptyStateSet)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_permission_state_resolves_immediately_on_match() {
        let (_engine, observer) = observed_engine();
        let state = observer
            .wait_for_permission_state(&[PermissionState::Granted])
            .await
            .unwrap();
        assert_eq!(state, PermissionState::Granted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_permission_state_awaits_transition() {
        let (engine, observer) = observed_engine();

        let (state, ()) = observer
            .wait_for_permission_state_with(&[PermissionState::Denied], async {
                engine
                    .permissions()
                    .set(GEOLOCATION, PermissionState::Denied);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(state, PermissionState::Denied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_permission_state_ignores_other_capabilities() {
        let (engine, observer) = observed_engine();

        let wait = observer.wait_for_permission_state(&[PermissionState::Denied]);
        tokio::pin!(wait);
        // First poll subscribes and finds no matching state yet.
        assert!(futures::poll!(wait.as_mut()).is_pending());

        engine
            .permissions()
            .set("notifications", PermissionState::Denied);
        // Still pending after the unrelated transition.
        assert!(futures::poll!(wait.as_mut()).is_pending());

        engine
            .permissions()
            .set(GEOLOCATION, PermissionState::Denied);
        assert_eq!(wait.await.unwrap(), PermissionState::Denied);
    }
}
