//! Position producers.
//!
//! The tracker treats a source as opaque: it asks for a watch, reads updates
//! in order, and reports whatever permission and error state the source
//! hands back. Sources never retry on the tracker's behalf.

mod channel;
mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::geo::Coordinate;

pub use channel::ChannelSource;
pub use simulated::{SimulatedWalk, SimulatedWalkConfig};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PermissionState {
    Prompt,
    Granted,
    Denied,
    Unavailable,
}

impl Default for PermissionState {
    fn default() -> Self {
        PermissionState::Prompt
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("location request timed out")]
    Timeout,
    #[error("geolocation is not supported on this device")]
    Unsupported,
}

impl GeolocationError {
    /// Permission state implied by the error, if any.
    pub fn permission_state(&self) -> Option<PermissionState> {
        match self {
            GeolocationError::PermissionDenied => Some(PermissionState::Denied),
            GeolocationError::Unsupported => Some(PermissionState::Unavailable),
            GeolocationError::PositionUnavailable(_) | GeolocationError::Timeout => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeoUpdate {
    Position(Coordinate),
    Permission(PermissionState),
    Error(GeolocationError),
}

/// Ordered stream of updates; dropping it unsubscribes.
pub type PositionWatch = mpsc::UnboundedReceiver<GeoUpdate>;

#[async_trait]
pub trait GeolocationSource: Send + Sync {
    fn permission_state(&self) -> PermissionState;

    /// Starts a subscription. Failures are delivered on the stream, so this
    /// never fails itself.
    async fn watch(&self) -> PositionWatch;

    /// One-shot fix.
    async fn current_position(&self) -> Result<Coordinate, GeolocationError>;
}
