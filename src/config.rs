use std::{env, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};

use crate::tracker::{TrackerConfig, MIN_MOVE_METERS};

const DATA_DIR_VAR: &str = "TERRATRAIL_DATA_DIR";
const DEBUG_VAR: &str = "TERRATRAIL_DEBUG";
const SEED_DEMO_VAR: &str = "TERRATRAIL_SEED_DEMO";
const JITTER_VAR: &str = "TERRATRAIL_JITTER_METERS";
const WALK_SECS_VAR: &str = "TERRATRAIL_WALK_SECS";

const DEFAULT_WALK_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    /// Heartbeat on every tick instead of every ten.
    pub debug: bool,
    /// Seed the demo neighbourhood into an empty territory set.
    pub seed_demo: bool,
    pub min_move_meters: f64,
    /// How long the bundled binary walks before stopping.
    pub walk_duration: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match lookup(DATA_DIR_VAR).filter(|value| !value.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .or_else(dirs::home_dir)
                .map(|base| base.join("terratrail"))
                .context("no data directory available; set TERRATRAIL_DATA_DIR")?,
        };

        let min_move_meters = match lookup(JITTER_VAR) {
            Some(raw) => {
                let meters: f64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{JITTER_VAR} must be a number, got {raw:?}"))?;
                if !meters.is_finite() || meters < 0.0 {
                    bail!("{JITTER_VAR} must be a non-negative number of meters, got {raw:?}");
                }
                meters
            }
            None => MIN_MOVE_METERS,
        };

        let walk_secs = match lookup(WALK_SECS_VAR) {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("{WALK_SECS_VAR} must be whole seconds, got {raw:?}"))?,
            None => DEFAULT_WALK_SECS,
        };

        Ok(Self {
            data_dir,
            debug: lookup(DEBUG_VAR).is_some_and(|raw| is_truthy(&raw)),
            seed_demo: lookup(SEED_DEMO_VAR).is_some_and(|raw| is_truthy(&raw)),
            min_move_meters,
            walk_duration: Duration::from_secs(walk_secs),
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("terratrail.sqlite3")
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            min_move_meters: self.min_move_meters,
            heartbeat_every_ticks: if self.debug { 1 } else { 10 },
            ..TrackerConfig::default()
        }
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
