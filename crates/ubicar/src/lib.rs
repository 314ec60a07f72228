//! Ubicar: Deterministic Geolocation Simulation for Tests
//!
//! Ubicar (Spanish: "to locate") is an in-process simulator of a platform
//! position-acquisition service and its paired permission service. A test
//! scripts ground-truth coordinates, permission decisions, and service
//! availability, then observes exactly the delivery and error sequences a
//! real consumer of such a service would see.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     UBICAR Architecture                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌─────────────┐   ┌──────────────┐              │
//! │  │ Coord /  │──►│ Acquisition │──►│ Watches and  │──► caller    │
//! │  │ Perm     │   │ Engine      │   │ Router       │   callbacks  │
//! │  │ Stores   │◄──│ (+ cache)   │◄──│              │              │
//! │  └──────────┘   └─────────────┘   └──────────────┘              │
//! │       ▲                                   ▲                     │
//! │  test control                     GeolocationObserver           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One-shot reads flow store → cache → engine → caller. Watches flow both
//! ways: the engine re-acquires whenever the ground truth or the
//! permission state moves, and pushes each outcome to the caller. The
//! [`router::DelegationRouter`] composes several independently permissioned
//! engines behind one handle and can swap which one is live without
//! invalidating watch ids.
//!
//! # Determinism
//!
//! Nothing here touches wall time or real sensors. Position timestamps come
//! from a [`clock::SimClock`] the test owns; timers ride the tokio clock,
//! so a current-thread runtime with a paused clock
//! (`#[tokio::test(start_paused = true)]`) gives a single logical thread of
//! control and fully reproducible timer ordering. No callback ever runs
//! before the public call that scheduled it has returned.
//!
//! # Example
//!
//! ```no_run
//! use ubicar::prelude::*;
//!
//! # async fn demo() {
//! let sim = GeolocationSimulator::new(
//!     SimulatorConfig::new()
//!         .with_coordinates(Coordinates::london())
//!         .with_permission(PermissionState::Granted),
//! );
//!
//! let position = sim
//!     .engine()
//!     .acquire_once(&PositionOptions::new())
//!     .await
//!     .expect("london is in service");
//! assert_eq!(position.coords, Coordinates::london());
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Simulated clock for position timestamps and cache ages
pub mod clock;

/// Acquisition engine: the request state machine and one-shot surface
pub mod engine;

/// Awaitable observation of positions, errors, and permission states
pub mod observer;

/// Access-permission store and the prompt/request protocol
pub mod permissions;

/// Value objects: coordinates, positions, errors, options, watch ids
pub mod position;

/// Delegation router over swappable engines
pub mod router;

/// Setup result and configuration-error types
pub mod result;

/// The public watch-capable service trait and callback aliases
pub mod service;

/// Simulator facade and configuration
pub mod simulator;

/// Coordinate ground-truth store
pub mod store;

mod cache;
mod watch;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::clock::SimClock;
    pub use super::engine::AcquisitionEngine;
    pub use super::observer::{CoordinatesMatcher, GeolocationObserver};
    pub use super::permissions::{
        PermissionChange, PermissionState, PermissionStore, RequestHandler, GEOLOCATION,
    };
    pub use super::position::{
        AccuracyTier, Coordinates, MaximumAge, Position, PositionError, PositionErrorCode,
        PositionOptions, WatchId,
    };
    pub use super::router::{DelegationRouter, SelectionListener};
    pub use super::result::{UbicarError, UbicarResult};
    pub use super::service::{PositionCallback, PositionErrorCallback, PositionService};
    pub use super::simulator::{GeolocationSimulator, SimulatorConfig};
    pub use super::store::CoordinateStore;
}
