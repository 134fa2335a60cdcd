pub mod controller;
pub mod state;
pub mod summary;

pub use controller::{TrackerConfig, TrackerController, TrackerError, TrackerEvent, TrackerSnapshot, MIN_MOVE_METERS};
pub use state::{PositionOutcome, TrackingSession, TrackingStatus};
pub use summary::WalkSummary;
