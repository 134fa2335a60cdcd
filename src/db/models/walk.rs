use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracker::WalkSummary;

/// A completed walk as stored in the history table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalkRecord {
    pub id: String,
    pub username: Option<String>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub distance_m: f64,
    pub elapsed_secs: u64,
    pub new_tiles: u64,
    pub total_tiles: u64,
    pub path: Vec<[f64; 2]>,
    pub created_at: DateTime<Utc>,
}

impl WalkRecord {
    pub fn from_summary(summary: &WalkSummary, username: Option<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: summary.id.clone(),
            username,
            started_at: summary.started_at,
            stopped_at: summary.stopped_at,
            distance_m: summary.distance_meters,
            elapsed_secs: summary.elapsed_seconds,
            new_tiles: summary.new_tiles as u64,
            total_tiles: summary.total_tiles as u64,
            path: summary.path.clone(),
            created_at,
        }
    }
}
