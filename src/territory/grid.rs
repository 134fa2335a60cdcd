//! Fixed-precision territory grid.
//!
//! A cell is the pair of coordinates rounded to [`GRID_PRECISION`] decimal
//! places. Cells are held as integer indices so the canonical key is exact and
//! never depends on float formatting.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decimal places kept on each axis. 3 → 0.001° ≈ 111 m of latitude.
///
/// Persisted keys are only meaningful for the precision they were written
/// with; the territory store records this value next to the set.
pub const GRID_PRECISION: u32 = 3;

const GRID_SCALE: i64 = 10_i64.pow(GRID_PRECISION);

/// Edge length of a cell in degrees.
pub const GRID_STEP: f64 = 1.0 / GRID_SCALE as f64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridKeyError {
    #[error("tile key '{0}' is not of the form <lat>_<lng>")]
    Malformed(String),
    #[error("tile key '{0}' is outside the coordinate range")]
    OutOfRange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    lat_index: i64,
    lng_index: i64,
}

/// Bounding rectangle of a cell, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl TileBounds {
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lng)
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.south + self.north) / 2.0, (self.west + self.east) / 2.0)
    }
}

impl GridCell {
    /// Rounds each axis independently, half away from zero.
    pub fn snap(lat: f64, lng: f64) -> Self {
        Self {
            lat_index: snap_index(lat),
            lng_index: snap_index(lng),
        }
    }

    /// Parses a tile key. Accepts both the canonical zero-padded form
    /// (`12.970_77.595`) and shortest-decimal keys (`12.97_77.595`).
    pub fn parse(key: &str) -> Result<Self, GridKeyError> {
        let malformed = || GridKeyError::Malformed(key.to_string());
        let (lat, lng) = key.split_once('_').ok_or_else(malformed)?;
        let lat: f64 = lat.trim().parse().map_err(|_| malformed())?;
        let lng: f64 = lng.trim().parse().map_err(|_| malformed())?;

        if !lat.is_finite() || !lng.is_finite() || lat.abs() > 90.0 || lng.abs() > 180.0 {
            return Err(GridKeyError::OutOfRange(key.to_string()));
        }

        Ok(Self::snap(lat, lng))
    }

    pub fn lat(&self) -> f64 {
        self.lat_index as f64 / GRID_SCALE as f64
    }

    pub fn lng(&self) -> f64 {
        self.lng_index as f64 / GRID_SCALE as f64
    }

    /// Canonical `"{lat}_{lng}"` key with exactly `GRID_PRECISION` decimals.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// The cell covers every coordinate that rounds onto it, so the rectangle
    /// extends half a step on either side of the snapped point.
    pub fn bounds(&self) -> TileBounds {
        let half = GRID_STEP / 2.0;
        TileBounds {
            south: self.lat() - half,
            west: self.lng() - half,
            north: self.lat() + half,
            east: self.lng() + half,
        }
    }

    pub fn offset(&self, d_lat: i64, d_lng: i64) -> Self {
        Self {
            lat_index: self.lat_index + d_lat,
            lng_index: self.lng_index + d_lng,
        }
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_index(f, self.lat_index)?;
        f.write_str("_")?;
        write_index(f, self.lng_index)
    }
}

fn snap_index(value: f64) -> i64 {
    (value * GRID_SCALE as f64).round() as i64
}

fn write_index(f: &mut fmt::Formatter<'_>, index: i64) -> fmt::Result {
    let sign = if index < 0 { "-" } else { "" };
    let abs = index.unsigned_abs();
    let scale = GRID_SCALE as u64;
    write!(
        f,
        "{sign}{}.{:0width$}",
        abs / scale,
        abs % scale,
        width = GRID_PRECISION as usize
    )
}

/// Canonical key for a raw coordinate.
pub fn tile_key(lat: f64, lng: f64) -> String {
    GridCell::snap(lat, lng).key()
}

/// Bounding rectangle for a tile key.
pub fn tile_bounds(key: &str) -> Result<TileBounds, GridKeyError> {
    GridCell::parse(key).map(|cell| cell.bounds())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearby_coordinates_share_a_key() {
        assert_eq!(tile_key(12.9716, 77.5946), "12.972_77.595");
        assert_eq!(tile_key(12.97181, 77.59472), "12.972_77.595");
        assert_ne!(tile_key(12.9716, 77.5946), tile_key(12.9706, 77.5946));
    }

    #[test]
    fn keys_are_zero_padded_and_signed() {
        assert_eq!(tile_key(12.97, 77.6), "12.970_77.600");
        assert_eq!(tile_key(-33.8688, 151.2093), "-33.869_151.209");
        assert_eq!(tile_key(-0.0004, 0.0004), "0.000_0.000");
        assert_eq!(tile_key(-0.0006, 0.0), "-0.001_0.000");
    }

    #[test]
    fn parse_accepts_short_and_canonical_forms() {
        let short = GridCell::parse("12.97_77.6").unwrap();
        let canonical = GridCell::parse("12.970_77.600").unwrap();
        assert_eq!(short, canonical);
        assert_eq!(short.key(), "12.970_77.600");

        assert!(matches!(GridCell::parse("12.97"), Err(GridKeyError::Malformed(_))));
        assert!(matches!(GridCell::parse("a_b"), Err(GridKeyError::Malformed(_))));
        assert!(matches!(GridCell::parse("95.0_10.0"), Err(GridKeyError::OutOfRange(_))));
    }

    #[test]
    fn bounds_contain_every_coordinate_that_maps_to_the_key() {
        let samples = [
            (12.9716, 77.5946),
            (12.97149, 77.59451),
            (-33.86875, 151.20925),
            (51.50071, -0.12461),
            (0.0, 0.0),
        ];
        for (lat, lng) in samples {
            let bounds = tile_bounds(&tile_key(lat, lng)).unwrap();
            assert!(bounds.contains(lat, lng), "{lat},{lng} not in {bounds:?}");
            assert!((bounds.north - bounds.south - GRID_STEP).abs() < 1e-9);
            assert!((bounds.east - bounds.west - GRID_STEP).abs() < 1e-9);
        }
    }

    #[test]
    fn bounds_are_centred_on_the_snapped_point() {
        let bounds = tile_bounds("12.972_77.595").unwrap();
        let (lat, lng) = bounds.center();
        assert!((lat - 12.972).abs() < 1e-9);
        assert!((lng - 77.595).abs() < 1e-9);
    }
}
