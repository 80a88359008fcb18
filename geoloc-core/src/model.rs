use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A point on Earth's surface in decimal degrees.
///
/// Immutable once produced; each successful acquisition replaces the previous
/// value wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// User-facing classification of a failed acquisition.
///
/// This is the complete set of reasons surfaced to callers; raw capability
/// errors never escape the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorReason {
    #[error("Geolocation is not supported on this system.")]
    Unsupported,

    #[error("Location permission denied. Please enable location access.")]
    PermissionDenied,

    #[error("Location information is unavailable.")]
    PositionUnavailable,

    #[error("Location request timed out. Please check your connection and try again.")]
    Timeout,

    #[error("An unknown error occurred.")]
    Unknown,
}

/// Lifecycle of a location request. Exactly one variant is active at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AcquisitionState {
    Loading,
    Success(Coordinates),
    Failed(ErrorReason),
}

impl AcquisitionState {
    /// The acquired fix; `Some` only in `Success`.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            AcquisitionState::Success(coordinates) => Some(*coordinates),
            _ => None,
        }
    }

    /// The failure reason; `Some` only in `Failed`.
    pub fn error(&self) -> Option<ErrorReason> {
        match self {
            AcquisitionState::Failed(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, AcquisitionState::Loading)
    }
}
