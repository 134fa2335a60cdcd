use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::format::{format_distance_km, format_duration};

use super::state::TrackingSession;

/// Final figures of a stopped walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkSummary {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub distance_meters: f64,
    pub elapsed_seconds: u64,
    pub new_tiles: usize,
    pub total_tiles: usize,
    pub path: Vec<[f64; 2]>,
}

impl WalkSummary {
    pub fn from_session(session: &TrackingSession, new_tiles: usize, total_tiles: usize) -> Self {
        let stopped_at = session.stopped_at.unwrap_or_else(Utc::now);
        Self {
            id: session.session_id.clone().unwrap_or_default(),
            started_at: session.started_at.unwrap_or(stopped_at),
            stopped_at,
            distance_meters: session.distance_meters,
            elapsed_seconds: session.elapsed_seconds,
            new_tiles,
            total_tiles,
            path: session.path.clone(),
        }
    }

    /// Whether the walk is worth adding to profile totals.
    pub fn has_activity(&self) -> bool {
        self.distance_meters > 0.0 || self.elapsed_seconds > 0
    }

    pub fn display_distance(&self) -> String {
        format_distance_km(self.distance_meters)
    }

    pub fn display_duration(&self) -> String {
        format_duration(self.elapsed_seconds)
    }
}
