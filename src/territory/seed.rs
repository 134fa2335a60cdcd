use chrono::{DateTime, Duration, Utc};

use super::{
    grid::GridCell,
    store::{CapturedTile, TerritoryMap},
};

/// Centre of the demo neighbourhood (Bengaluru MG Road).
pub const DEMO_CENTER: (f64, f64) = (12.9716, 77.5946);

const PARK_CORNER: (f64, f64) = (12.976, 77.592);

/// Ring around the park plus a partly filled interior, as (lat, lng) steps
/// from the park corner.
const PARK_LOOP: [(i64, i64); 30] = [
    (0, 0), (0, 1), (0, 2), (0, 3), (0, 4), (0, 5),
    (1, 5), (2, 5), (3, 5), (4, 5),
    (4, 4), (4, 3), (4, 2), (4, 1), (4, 0),
    (3, 0), (2, 0), (1, 0),
    (1, 1), (1, 2), (2, 1), (2, 2), (2, 3), (3, 1), (3, 2), (3, 3), (3, 4), (1, 3), (1, 4), (2, 4),
];

/// Back-dated territory resembling a few walks through one neighbourhood, for
/// first-run demos. Later paths overwrite earlier timestamps where they cross.
pub fn demo_territories(now: DateTime<Utc>) -> TerritoryMap {
    let mut tiles = TerritoryMap::new();
    let center = GridCell::snap(DEMO_CENTER.0, DEMO_CENTER.1);
    let park = GridCell::snap(PARK_CORNER.0, PARK_CORNER.1);

    let mut mark = |cell: GridCell, age: Duration| {
        tiles.insert(
            cell.key(),
            CapturedTile {
                captured_at: (now - age).timestamp_millis(),
            },
        );
    };

    // north along the main road, yesterday
    for i in 0..15 {
        mark(center.offset(i, 0), Duration::days(1));
    }

    // east-west road, two days ago
    for i in -8..12 {
        mark(center.offset(0, i), Duration::days(2));
    }

    // north-east diagonal, twelve hours ago
    for i in 0..10 {
        mark(center.offset(i, i), Duration::hours(12));
    }

    // park loop, two hours ago
    for (d_lat, d_lng) in PARK_LOOP {
        mark(park.offset(d_lat, d_lng), Duration::hours(2));
    }

    // two-wide strip heading south, an hour ago
    for i in 0..8 {
        mark(center.offset(-i, 2), Duration::hours(1));
        mark(center.offset(-i, 3), Duration::hours(1));
    }

    tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_set_is_canonical_and_back_dated() {
        let now = Utc::now();
        let tiles = demo_territories(now);

        assert!(tiles.len() > 60);
        for (key, tile) in &tiles {
            assert_eq!(&GridCell::parse(key).unwrap().key(), key);
            assert!(tile.captured_at < now.timestamp_millis());
        }
        assert!(tiles.contains_key("12.972_77.595"));
    }
}
