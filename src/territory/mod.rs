pub mod grid;
pub mod seed;
pub mod store;

pub use grid::{tile_bounds, tile_key, GridCell, GridKeyError, TileBounds, GRID_PRECISION, GRID_STEP};
pub use store::{CaptureEvent, CaptureResult, CapturedTile, SeedPolicy, TerritoryMap, TerritoryStore};
