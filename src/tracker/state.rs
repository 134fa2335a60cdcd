use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{haversine_m, Coordinate};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackingStatus {
    Idle,
    Tracking,
    Summary,
}

impl Default for TrackingStatus {
    fn default() -> Self {
        TrackingStatus::Idle
    }
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::Idle => "idle",
            TrackingStatus::Tracking => "tracking",
            TrackingStatus::Summary => "summary",
        }
    }
}

/// What happened to one raw fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PositionOutcome {
    /// Not tracking; the fix was dropped.
    Ignored,
    /// NaN or outside the coordinate range.
    Invalid,
    /// Closer than the jitter threshold to the last accepted fix.
    Rejected { distance_m: f64 },
    /// Appended to the path. `distance_m` is zero for the first fix.
    Accepted { distance_m: f64 },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSession {
    pub status: TrackingStatus,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    /// `[lng, lat]` vertices.
    pub path: Vec<[f64; 2]>,
    pub distance_meters: f64,
    pub elapsed_seconds: u64,
    pub last_accepted: Option<Coordinate>,
}

impl TrackingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tracking(&self) -> bool {
        self.status == TrackingStatus::Tracking
    }

    pub fn begin(&mut self, session_id: String, started_at: DateTime<Utc>) {
        *self = Self {
            status: TrackingStatus::Tracking,
            session_id: Some(session_id),
            started_at: Some(started_at),
            ..Self::default()
        };
    }

    /// Jitter filter and distance accumulation for one fix.
    pub fn accept_position(&mut self, position: Coordinate, min_move_meters: f64) -> PositionOutcome {
        if !self.is_tracking() {
            return PositionOutcome::Ignored;
        }
        if !position.is_valid() {
            return PositionOutcome::Invalid;
        }

        let distance_m = match self.last_accepted {
            Some(last) => {
                let distance = haversine_m(&last, &position);
                if distance < min_move_meters {
                    return PositionOutcome::Rejected { distance_m: distance };
                }
                distance
            }
            None => 0.0,
        };

        self.distance_meters += distance_m;
        self.path.push(position.to_lng_lat());
        self.last_accepted = Some(position);
        PositionOutcome::Accepted { distance_m }
    }

    /// Advances the clock by one second. Returns false outside `tracking`.
    pub fn tick(&mut self) -> bool {
        if !self.is_tracking() {
            return false;
        }
        self.elapsed_seconds += 1;
        true
    }

    pub fn finish(&mut self, stopped_at: DateTime<Utc>) {
        self.status = TrackingStatus::Summary;
        self.stopped_at = Some(stopped_at);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
