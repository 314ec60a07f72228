//! Position value objects.
//!
//! Immutable records exchanged between the simulation core and its callers:
//! geographic coordinates, timestamped positions, the position error value
//! delivered through the error channel, and the options accepted by
//! `get_current_position` / `watch_position`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::result::{UbicarError, UbicarResult};

// =============================================================================
// ACCURACY TIER
// =============================================================================

/// Accuracy bucket a request targets.
///
/// Each tier has its own ground-truth slot in the coordinate store and its
/// own cache slot. A high-accuracy request never reads the low-accuracy
/// slot, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccuracyTier {
    /// Coarse positioning (network-level fix)
    Low,
    /// Precise positioning (GPS-level fix)
    High,
}

impl AccuracyTier {
    /// Tier selected by the `enable_high_accuracy` request flag
    #[must_use]
    pub const fn from_flag(enable_high_accuracy: bool) -> Self {
        if enable_high_accuracy {
            Self::High
        } else {
            Self::Low
        }
    }

    /// Index into per-tier slot arrays
    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }
}

impl fmt::Display for AccuracyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::High => write!(f, "high"),
        }
    }
}

// =============================================================================
// COORDINATES
// =============================================================================

/// Geographic coordinates with accuracy and optional motion fields.
///
/// Immutable once constructed; equality is field-wise. Construct through
/// [`Coordinates::new`] (validating) or [`Coordinates::try_new`] and extend
/// with the `with_*` builders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in decimal degrees (-90.0 to 90.0)
    pub latitude: f64,
    /// Longitude in decimal degrees (-180.0 to 180.0)
    pub longitude: f64,
    /// Accuracy in meters (non-negative)
    pub accuracy: f64,
    /// Altitude in meters (optional)
    pub altitude: Option<f64>,
    /// Altitude accuracy in meters (optional)
    pub altitude_accuracy: Option<f64>,
    /// Heading in degrees (0-360, optional)
    pub heading: Option<f64>,
    /// Speed in meters per second (optional)
    pub speed: Option<f64>,
}

impl Coordinates {
    /// Create coordinates with the required fields.
    ///
    /// # Panics
    /// Panics if latitude, longitude, or accuracy are out of range. Use
    /// [`Coordinates::try_new`] for a non-panicking variant.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self::try_new(latitude, longitude, accuracy)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Create coordinates, rejecting out-of-range fields.
    pub fn try_new(latitude: f64, longitude: f64, accuracy: f64) -> UbicarResult<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(UbicarError::InvalidCoordinates {
                message: format!("latitude {latitude} outside [-90, 90]"),
            });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(UbicarError::InvalidCoordinates {
                message: format!("longitude {longitude} outside [-180, 180]"),
            });
        }
        if !(accuracy >= 0.0) {
            return Err(UbicarError::InvalidCoordinates {
                message: format!("accuracy {accuracy} must be non-negative"),
            });
        }
        Ok(Self {
            latitude,
            longitude,
            accuracy,
            altitude: None,
            altitude_accuracy: None,
            heading: None,
            speed: None,
        })
    }

    /// Set altitude and altitude accuracy
    #[must_use]
    pub fn with_altitude(mut self, altitude: f64, accuracy: f64) -> Self {
        self.altitude = Some(altitude);
        self.altitude_accuracy = Some(accuracy);
        self
    }

    /// Set heading (direction of travel, 0-360 degrees)
    #[must_use]
    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// Set speed in meters per second
    #[must_use]
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    // === Preset Locations ===

    /// New York City, USA (Times Square)
    #[must_use]
    pub fn new_york() -> Self {
        Self::new(40.758896, -73.985130, 10.0)
    }

    /// Tokyo, Japan (Shibuya Crossing)
    #[must_use]
    pub fn tokyo() -> Self {
        Self::new(35.659492, 139.700472, 10.0)
    }

    /// London, UK (Trafalgar Square)
    #[must_use]
    pub fn london() -> Self {
        Self::new(51.508039, -0.128069, 10.0)
    }

    /// Paris, France (Eiffel Tower)
    #[must_use]
    pub fn paris() -> Self {
        Self::new(48.858370, 2.294481, 10.0)
    }

    /// Sydney, Australia (Opera House)
    #[must_use]
    pub fn sydney() -> Self {
        Self::new(-33.856784, 151.215297, 10.0)
    }

    /// Berlin, Germany (Brandenburg Gate)
    #[must_use]
    pub fn berlin() -> Self {
        Self::new(52.516275, 13.377704, 10.0)
    }
}

// =============================================================================
// POSITION
// =============================================================================

/// A successfully acquired position: coordinates plus acquisition time.
///
/// Created fresh on every successful acquisition and immutable thereafter.
/// The accuracy tier is internal cache bookkeeping and is not part of the
/// platform-standard shape exposed to position consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// The acquired coordinates
    pub coords: Coordinates,
    /// Simulated-clock timestamp of the acquisition, in milliseconds
    pub timestamp_ms: u64,
    tier: AccuracyTier,
}

impl Position {
    /// Only the acquisition engine mints positions.
    pub(crate) fn new(coords: Coordinates, timestamp_ms: u64, tier: AccuracyTier) -> Self {
        Self {
            coords,
            timestamp_ms,
            tier,
        }
    }

    /// Cache bucket this position was acquired for
    pub(crate) fn tier(&self) -> AccuracyTier {
        self.tier
    }
}

// =============================================================================
// POSITION ERROR
// =============================================================================

/// Kind of a terminal position failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionErrorCode {
    /// No or insufficient access to the position capability
    PermissionDenied,
    /// The store has no fix, or the read failed
    PositionUnavailable,
    /// The deadline elapsed before the acquisition resolved
    Timeout,
}

impl fmt::Display for PositionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "PERMISSION_DENIED"),
            Self::PositionUnavailable => write!(f, "POSITION_UNAVAILABLE"),
            Self::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// Terminal failure of a position request.
///
/// A plain result value delivered through the error channel, not a fault
/// type. Callers distinguish outcomes structurally via [`PositionError::code`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionError {
    /// Failure kind
    pub code: PositionErrorCode,
    /// Human-readable detail; empty for engine-produced errors
    pub message: String,
}

impl PositionError {
    /// Access to the position capability was denied
    #[must_use]
    pub fn permission_denied() -> Self {
        Self {
            code: PositionErrorCode::PermissionDenied,
            message: String::new(),
        }
    }

    /// No fix is available for the requested tier
    #[must_use]
    pub fn position_unavailable() -> Self {
        Self {
            code: PositionErrorCode::PositionUnavailable,
            message: String::new(),
        }
    }

    /// The request deadline elapsed
    #[must_use]
    pub fn timeout() -> Self {
        Self {
            code: PositionErrorCode::Timeout,
            message: String::new(),
        }
    }

    /// Attach a message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

// =============================================================================
// REQUEST OPTIONS
// =============================================================================

/// Cache acceptance policy for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MaximumAge {
    /// Never accept a cached position; always acquire fresh
    #[default]
    Zero,
    /// Accept a cached position no older than the given duration
    Finite(Duration),
    /// Accept a matching-tier cached position regardless of age
    Infinite,
}

/// Options for `get_current_position` and `watch_position`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionOptions {
    /// Target the high-accuracy tier
    pub enable_high_accuracy: bool,
    /// Deadline for each acquisition attempt; `None` waits forever
    pub timeout: Option<Duration>,
    /// Cache acceptance policy
    pub maximum_age: MaximumAge,
}

impl PositionOptions {
    /// Options with platform defaults: low accuracy, no deadline, no cache reuse
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Target the high-accuracy tier
    #[must_use]
    pub const fn with_high_accuracy(mut self, enable: bool) -> Self {
        self.enable_high_accuracy = enable;
        self
    }

    /// Set the per-attempt deadline
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the cache acceptance policy
    #[must_use]
    pub const fn with_maximum_age(mut self, maximum_age: MaximumAge) -> Self {
        self.maximum_age = maximum_age;
        self
    }

    /// Tier this request targets
    #[must_use]
    pub const fn tier(&self) -> AccuracyTier {
        AccuracyTier::from_flag(self.enable_high_accuracy)
    }
}

// =============================================================================
// WATCH IDENTIFIER
// =============================================================================

/// Caller-visible handle for an active watch.
///
/// Unique for the lifetime of the engine or router that issued it. Survives
/// delegate switches unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchId(pub(crate) u64);

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Coordinates ===

    #[test]
    fn test_coordinates_new() {
        let c = Coordinates::new(40.7128, -74.0060, 5.0);
        assert!((c.latitude - 40.7128).abs() < 0.0001);
        assert!((c.longitude - (-74.0060)).abs() < 0.0001);
        assert!(c.altitude.is_none());
        assert!(c.heading.is_none());
        assert!(c.speed.is_none());
    }

    #[test]
    fn test_coordinates_try_new_rejects_latitude() {
        assert!(Coordinates::try_new(91.0, 0.0, 10.0).is_err());
        assert!(Coordinates::try_new(-91.0, 0.0, 10.0).is_err());
    }

    #[test]
    fn test_coordinates_try_new_rejects_longitude() {
        assert!(Coordinates::try_new(0.0, 181.0, 10.0).is_err());
        assert!(Coordinates::try_new(0.0, -181.0, 10.0).is_err());
    }

    #[test]
    fn test_coordinates_try_new_rejects_negative_accuracy() {
        assert!(Coordinates::try_new(0.0, 0.0, -1.0).is_err());
    }

    #[test]
    fn test_coordinates_try_new_rejects_nan_accuracy() {
        assert!(Coordinates::try_new(0.0, 0.0, f64::NAN).is_err());
    }

    #[test]
    #[should_panic(expected = "latitude")]
    fn test_coordinates_new_panics_out_of_range() {
        let _ = Coordinates::new(90.5, 0.0, 10.0);
    }

    #[test]
    fn test_coordinates_builder_chain() {
        let c = Coordinates::new(40.7128, -74.0060, 5.0)
            .with_altitude(10.0, 2.0)
            .with_heading(45.0)
            .with_speed(5.0);
        assert_eq!(c.altitude, Some(10.0));
        assert_eq!(c.altitude_accuracy, Some(2.0));
        assert_eq!(c.heading, Some(45.0));
        assert_eq!(c.speed, Some(5.0));
    }

    #[test]
    fn test_coordinates_field_wise_equality() {
        let a = Coordinates::new(40.0, -74.0, 10.0);
        let b = Coordinates::new(40.0, -74.0, 10.0);
        let c = Coordinates::new(40.0, -74.0, 15.0);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_preset_locations() {
        assert!(Coordinates::sydney().latitude < 0.0);
        assert!(Coordinates::london().longitude < 0.0);
        assert!((Coordinates::tokyo().latitude - 35.659492).abs() < 0.0001);
    }

    // === Accuracy tier ===

    #[test]
    fn test_tier_from_flag() {
        assert_eq!(AccuracyTier::from_flag(true), AccuracyTier::High);
        assert_eq!(AccuracyTier::from_flag(false), AccuracyTier::Low);
    }

    // === Errors ===

    #[test]
    fn test_error_constructors_have_empty_messages() {
        assert_eq!(PositionError::permission_denied().message, "");
        assert_eq!(PositionError::position_unavailable().message, "");
        assert_eq!(PositionError::timeout().message, "");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(PositionError::timeout().to_string(), "TIMEOUT");
        assert_eq!(
            PositionError::permission_denied()
                .with_message("blocked by policy")
                .to_string(),
            "PERMISSION_DENIED: blocked by policy"
        );
    }

    // === Options ===

    #[test]
    fn test_options_defaults() {
        let opts = PositionOptions::new();
        assert!(!opts.enable_high_accuracy);
        assert!(opts.timeout.is_none());
        assert_eq!(opts.maximum_age, MaximumAge::Zero);
        assert_eq!(opts.tier(), AccuracyTier::Low);
    }

    #[test]
    fn test_options_builder() {
        let opts = PositionOptions::new()
            .with_high_accuracy(true)
            .with_timeout(Duration::from_millis(250))
            .with_maximum_age(MaximumAge::Infinite);
        assert!(opts.enable_high_accuracy);
        assert_eq!(opts.timeout, Some(Duration::from_millis(250)));
        assert_eq!(opts.maximum_age, MaximumAge::Infinite);
        assert_eq!(opts.tier(), AccuracyTier::High);
    }

    // === Serialization ===

    #[test]
    fn test_position_serde_round_trip() {
        let position = Position::new(
            Coordinates::berlin().with_heading(270.0),
            12_500,
            AccuracyTier::High,
        );
        let json = serde_json::to_string(&position).unwrap();
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(position, back);
    }

    #[test]
    fn test_watch_id_display() {
        assert_eq!(WatchId(7).to_string(), "watch#7");
    }
}
