//! Result and error types for Ubicar.
//!
//! Runtime outcomes of position requests are *values* ([`crate::position::PositionError`])
//! delivered through the error channel, never `Err`. The error type here covers
//! configuration misuse at setup time only.

use thiserror::Error;

/// Result type for Ubicar setup operations
pub type UbicarResult<T> = Result<T, UbicarError>;

/// Errors that can occur while wiring up a simulation
#[derive(Debug, Error)]
pub enum UbicarError {
    /// Delegation router constructed with an empty registry
    #[error("delegation router requires at least one delegate")]
    NoDelegates,

    /// A delegate has no paired permission store
    #[error("delegate at index {index} has no paired permission store")]
    MissingPermissionStore {
        /// Position of the delegate in the registry
        index: usize,
    },

    /// A delegate handle that is not part of the router's registry
    #[error("delegate is not registered with this router")]
    UnknownDelegate,

    /// `wait_for_permission_state` called with an empty state set
    #[error("waiting on permission state requires at least one target state")]
    EmptyStateSet,

    /// Coordinate fields outside their valid ranges
    #[error("invalid coordinates: {message}")]
    InvalidCoordinates {
        /// What was out of range
        message: String,
    },

    /// The observed watch stopped delivering before a match was seen
    #[error("watch stopped delivering before a match was observed")]
    WatchTerminated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UbicarError::NoDelegates;
        assert_eq!(
            err.to_string(),
            "delegation router requires at least one delegate"
        );

        let err = UbicarError::MissingPermissionStore { index: 2 };
        assert_eq!(
            err.to_string(),
            "delegate at index 2 has no paired permission store"
        );
    }

    #[test]
    fn test_invalid_coordinates_message() {
        let err = UbicarError::InvalidCoordinates {
            message: "latitude 91 out of range".to_string(),
        };
        assert!(err.to_string().contains("latitude 91"));
    }
}
