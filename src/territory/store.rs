use std::{collections::BTreeMap, sync::Arc};

use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{
    load_json, quarantine, save_json, KeyValueStore, Stored, GRID_PRECISION_KEY, TERRITORIES_KEY,
};

use super::{
    grid::{GridCell, GridKeyError, TileBounds, GRID_PRECISION},
    seed::demo_territories,
};

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedTile {
    /// Unix milliseconds.
    pub captured_at: i64,
}

impl CapturedTile {
    pub fn captured_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.captured_at).single()
    }
}

/// Every tile the local user owns, keyed by canonical tile key.
pub type TerritoryMap = BTreeMap<String, CapturedTile>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub is_new: bool,
    pub key: String,
    /// Set only when the tile was newly owned.
    pub event: Option<CaptureEvent>,
}

/// Describes one newly owned tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureEvent {
    pub key: String,
    pub captured_at: DateTime<Utc>,
    pub bounds: TileBounds,
    pub session_count: usize,
    pub total_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedPolicy {
    #[default]
    Never,
    /// Seed the demo neighbourhood when nothing has been captured yet.
    DemoWhenEmpty,
}

/// Durable set of captured tiles plus the log of tiles first captured in the
/// current session.
pub struct TerritoryStore {
    port: Arc<dyn KeyValueStore>,
    tiles: TerritoryMap,
    session_tiles: Vec<String>,
}

impl TerritoryStore {
    /// Reads the persisted set once. Unreadable data is copied aside and the
    /// store starts empty; it is never reseeded over.
    pub async fn load(port: Arc<dyn KeyValueStore>, seed: SeedPolicy) -> Result<Self> {
        let recorded_precision = load_json::<u32>(port.as_ref(), GRID_PRECISION_KEY)
            .await?
            .into_option();
        let loaded = match recorded_precision {
            Some(precision) if precision != GRID_PRECISION => {
                let raw = port.get(TERRITORIES_KEY).await?.unwrap_or_default();
                let backup =
                    quarantine(port.as_ref(), TERRITORIES_KEY, &format!("p{precision}"), &raw).await?;
                log_warn!(
                    "territories were captured at grid precision {precision}, current is {GRID_PRECISION}; kept aside as {backup}"
                );
                None
            }
            _ => Self::read_tiles(port.as_ref()).await?,
        };

        let (tiles, rewrite) = match loaded {
            Some(tiles) if tiles.is_empty() && seed == SeedPolicy::DemoWhenEmpty => {
                log_info!("seeding demo territories");
                (demo_territories(Utc::now()), true)
            }
            Some(tiles) => (tiles, false),
            // the old document is already set aside
            None => (TerritoryMap::new(), true),
        };

        let store = Self {
            port,
            tiles,
            session_tiles: Vec::new(),
        };

        if rewrite {
            store.persist().await?;
        }
        // Written here only, so a capture is always a single write.
        if recorded_precision != Some(GRID_PRECISION) {
            save_json(store.port.as_ref(), GRID_PRECISION_KEY, &GRID_PRECISION).await?;
        }
        log_info!("territory store loaded with {} tiles", store.tiles.len());

        Ok(store)
    }

    /// `None` when the persisted set had to be quarantined.
    async fn read_tiles(port: &dyn KeyValueStore) -> Result<Option<TerritoryMap>> {
        match load_json::<TerritoryMap>(port, TERRITORIES_KEY).await? {
            Stored::Missing => Ok(Some(TerritoryMap::new())),
            Stored::Value(tiles) => Ok(Some(canonicalize(tiles))),
            Stored::Corrupt { raw, error } => {
                let backup = quarantine(port, TERRITORIES_KEY, "corrupt", &raw).await?;
                log_warn!("territories unreadable ({error}); kept aside as {backup}, starting empty");
                Ok(None)
            }
        }
    }

    pub async fn capture_tile(&mut self, lat: f64, lng: f64) -> Result<CaptureResult> {
        self.capture_tile_at(lat, lng, Utc::now()).await
    }

    /// Owns the tile containing `(lat, lng)`. Already-owned tiles are left
    /// untouched. A failed write leaves the in-memory set unchanged.
    pub async fn capture_tile_at(&mut self, lat: f64, lng: f64, now: DateTime<Utc>) -> Result<CaptureResult> {
        if !lat.is_finite() || !lng.is_finite() || lat.abs() > 90.0 || lng.abs() > 180.0 {
            bail!("cannot capture tile at invalid coordinate ({lat}, {lng})");
        }

        let cell = GridCell::snap(lat, lng);
        let key = cell.key();
        if self.tiles.contains_key(&key) {
            return Ok(CaptureResult {
                is_new: false,
                key,
                event: None,
            });
        }

        self.tiles.insert(
            key.clone(),
            CapturedTile {
                captured_at: now.timestamp_millis(),
            },
        );
        if let Err(err) = self.persist().await {
            self.tiles.remove(&key);
            return Err(err.context(format!("failed to persist captured tile {key}")));
        }
        self.session_tiles.push(key.clone());

        log_debug!("captured tile {key} ({} this session)", self.session_tiles.len());

        let event = CaptureEvent {
            key: key.clone(),
            captured_at: now,
            bounds: cell.bounds(),
            session_count: self.session_tiles.len(),
            total_count: self.tiles.len(),
        };

        Ok(CaptureResult {
            is_new: true,
            key,
            event: Some(event),
        })
    }

    pub fn reset_session(&mut self) {
        self.session_tiles.clear();
    }

    pub fn tile_bounds(&self, key: &str) -> Result<TileBounds, GridKeyError> {
        super::grid::tile_bounds(key)
    }

    pub fn total_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn session_count(&self) -> usize {
        self.session_tiles.len()
    }

    pub fn session_tiles(&self) -> &[String] {
        &self.session_tiles
    }

    pub fn territories(&self) -> &TerritoryMap {
        &self.tiles
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tiles.contains_key(key)
    }

    async fn persist(&self) -> Result<()> {
        save_json(self.port.as_ref(), TERRITORIES_KEY, &self.tiles).await
    }
}

/// Rewrites keys into canonical form, keeping the earliest capture when two
/// spellings name the same tile. Unparsable keys are dropped.
fn canonicalize(tiles: TerritoryMap) -> TerritoryMap {
    let mut canonical = TerritoryMap::new();
    for (key, tile) in tiles {
        let cell = match GridCell::parse(&key) {
            Ok(cell) => cell,
            Err(err) => {
                log_warn!("dropping persisted tile: {err}");
                continue;
            }
        };
        canonical
            .entry(cell.key())
            .and_modify(|existing: &mut CapturedTile| {
                existing.captured_at = existing.captured_at.min(tile.captured_at);
            })
            .or_insert(tile);
    }
    canonical
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 7, 30, 0).unwrap()
    }

    async fn empty_store() -> (Arc<MemoryStore>, TerritoryStore) {
        let port = Arc::new(MemoryStore::new());
        let store = TerritoryStore::load(port.clone(), SeedPolicy::Never)
            .await
            .unwrap();
        (port, store)
    }

    #[tokio::test]
    async fn first_capture_in_a_cell_is_new_and_later_ones_are_not() {
        let (_, mut store) = empty_store().await;

        let first = store.capture_tile_at(12.9716, 77.5946, fixed_now()).await.unwrap();
        let second = store.capture_tile_at(12.97181, 77.59472, Utc::now()).await.unwrap();

        assert!(first.is_new);
        assert!(!second.is_new);
        assert_eq!(first.key, second.key);
        assert_eq!(store.total_count(), 1);
        assert_eq!(store.session_count(), 1);
        // never re-timestamped
        assert_eq!(
            store.territories()[&first.key].captured_at,
            fixed_now().timestamp_millis()
        );
    }

    #[tokio::test]
    async fn every_capture_is_flushed_to_the_port() {
        let (port, mut store) = empty_store().await;
        store.capture_tile_at(12.9716, 77.5946, fixed_now()).await.unwrap();

        let persisted: TerritoryMap = load_json(port.as_ref(), TERRITORIES_KEY)
            .await
            .unwrap()
            .into_option()
            .unwrap();
        assert_eq!(persisted.len(), 1);
        assert!(persisted.contains_key("12.972_77.595"));

        let reloaded = TerritoryStore::load(port, SeedPolicy::Never).await.unwrap();
        assert_eq!(reloaded.total_count(), 1);
        assert_eq!(reloaded.session_count(), 0);
    }

    #[tokio::test]
    async fn session_count_tracks_distinct_new_cells_only() {
        let (port, mut store) = empty_store().await;
        store.capture_tile_at(10.0, 10.0, fixed_now()).await.unwrap();
        store.capture_tile_at(10.001, 10.0, fixed_now()).await.unwrap();
        drop(store);

        let mut store = TerritoryStore::load(port, SeedPolicy::Never).await.unwrap();
        store.reset_session();
        for (lat, lng) in [
            (10.0, 10.0),     // owned before
            (10.002, 10.0),   // new
            (10.0021, 10.0),  // same cell again
            (10.003, 10.0),   // new
            (10.001, 10.0),   // owned before
        ] {
            store.capture_tile_at(lat, lng, fixed_now()).await.unwrap();
        }

        assert_eq!(store.session_count(), 2);
        assert_eq!(store.session_tiles(), ["10.002_10.000", "10.003_10.000"]);
        assert_eq!(store.total_count(), 4);

        store.reset_session();
        assert_eq!(store.session_count(), 0);
        assert_eq!(store.total_count(), 4);
    }

    #[tokio::test]
    async fn failed_write_rolls_back_the_capture() {
        let (port, mut store) = empty_store().await;
        port.fail_writes(true);

        assert!(store.capture_tile_at(1.0, 1.0, fixed_now()).await.is_err());
        assert_eq!(store.total_count(), 0);
        assert_eq!(store.session_count(), 0);

        port.fail_writes(false);
        assert!(store.capture_tile_at(1.0, 1.0, fixed_now()).await.unwrap().is_new);
    }

    #[tokio::test]
    async fn invalid_coordinates_are_refused() {
        let (_, mut store) = empty_store().await;
        assert!(store.capture_tile(f64::NAN, 0.0).await.is_err());
        assert!(store.capture_tile(0.0, 200.0).await.is_err());
        assert_eq!(store.total_count(), 0);
    }

    #[tokio::test]
    async fn only_new_captures_carry_an_event() {
        let (_, mut store) = empty_store().await;

        let first = store.capture_tile_at(12.9716, 77.5946, fixed_now()).await.unwrap();
        let again = store.capture_tile_at(12.9716, 77.5946, fixed_now()).await.unwrap();

        let event = first.event.unwrap();
        assert_eq!(event.key, "12.972_77.595");
        assert_eq!(event.captured_at, fixed_now());
        assert_eq!(event.session_count, 1);
        assert_eq!(event.total_count, 1);
        assert!(event.bounds.contains(12.9716, 77.5946));
        assert!(again.event.is_none());
    }

    #[tokio::test]
    async fn precision_marker_is_written_once_at_load() {
        let (port, mut store) = empty_store().await;
        assert_eq!(port.get(GRID_PRECISION_KEY).await.unwrap().as_deref(), Some("3"));

        port.fail_writes_to(Some(GRID_PRECISION_KEY));
        let capture = store.capture_tile_at(1.0, 1.0, fixed_now()).await.unwrap();
        assert!(capture.is_new);

        let persisted: TerritoryMap = load_json(port.as_ref(), TERRITORIES_KEY)
            .await
            .unwrap()
            .into_option()
            .unwrap();
        assert_eq!(persisted.len(), store.total_count());
    }

    #[tokio::test]
    async fn failed_tile_write_leaves_port_and_memory_in_agreement() {
        let (port, mut store) = empty_store().await;
        port.fail_writes_to(Some(TERRITORIES_KEY));

        assert!(store.capture_tile_at(1.0, 1.0, fixed_now()).await.is_err());
        assert_eq!(store.total_count(), 0);
        assert!(port.get(TERRITORIES_KEY).await.unwrap().is_none());

        port.fail_writes_to(None);
        let reloaded = TerritoryStore::load(port, SeedPolicy::Never).await.unwrap();
        assert_eq!(reloaded.total_count(), 0);
    }

    #[tokio::test]
    async fn corrupt_territories_are_kept_aside_not_reseeded() {
        let port = Arc::new(MemoryStore::new());
        port.set(TERRITORIES_KEY, "{\"12.9_77.5\": 42").await.unwrap();

        let store = TerritoryStore::load(port.clone(), SeedPolicy::DemoWhenEmpty)
            .await
            .unwrap();
        // demo data would hide the loss
        assert_eq!(store.total_count(), 0);
        assert_eq!(
            port.get("terratrail_territories.corrupt").await.unwrap().as_deref(),
            Some("{\"12.9_77.5\": 42")
        );
    }

    #[tokio::test]
    async fn corrupt_territories_without_seeding_start_empty() {
        let port = Arc::new(MemoryStore::new());
        port.set(TERRITORIES_KEY, "not json").await.unwrap();

        let store = TerritoryStore::load(port.clone(), SeedPolicy::Never).await.unwrap();
        assert_eq!(store.total_count(), 0);
        assert!(port.get("terratrail_territories.corrupt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_store_is_seeded_only_when_asked() {
        let port = Arc::new(MemoryStore::new());
        let store = TerritoryStore::load(port.clone(), SeedPolicy::DemoWhenEmpty)
            .await
            .unwrap();
        assert!(store.total_count() > 60);
        assert!(port.get(TERRITORIES_KEY).await.unwrap().is_some());

        let (_, unseeded) = empty_store().await;
        assert_eq!(unseeded.total_count(), 0);
    }

    #[tokio::test]
    async fn legacy_short_keys_are_canonicalised_keeping_the_earliest_capture() {
        let port = Arc::new(MemoryStore::new());
        port.set(
            TERRITORIES_KEY,
            r#"{"12.97_77.6": {"capturedAt": 200}, "12.970_77.600": {"capturedAt": 100}, "junk": {"capturedAt": 1}}"#,
        )
        .await
        .unwrap();

        let store = TerritoryStore::load(port, SeedPolicy::Never).await.unwrap();
        assert_eq!(store.total_count(), 1);
        assert_eq!(store.territories()["12.970_77.600"].captured_at, 100);
    }

    #[tokio::test]
    async fn precision_mismatch_sets_old_keys_aside() {
        let port = Arc::new(MemoryStore::new());
        port.set(TERRITORIES_KEY, r#"{"12.97_77.59": {"capturedAt": 1}}"#)
            .await
            .unwrap();
        port.set(GRID_PRECISION_KEY, "2").await.unwrap();

        let store = TerritoryStore::load(port.clone(), SeedPolicy::Never).await.unwrap();
        assert_eq!(store.total_count(), 0);
        assert!(port.get("terratrail_territories.p2").await.unwrap().is_some());
        assert_eq!(port.get(GRID_PRECISION_KEY).await.unwrap().as_deref(), Some("3"));

        // the old keys must not come back under the new precision
        let reloaded = TerritoryStore::load(port, SeedPolicy::Never).await.unwrap();
        assert_eq!(reloaded.total_count(), 0);
    }
}
