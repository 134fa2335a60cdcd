use std::{f64::consts::PI, time::Duration};

use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::geo::Coordinate;

use super::{GeoUpdate, GeolocationError, GeolocationSource, PermissionState, PositionWatch};

const ENABLE_LOGS: bool = false;
use crate::log_debug;

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

#[derive(Debug, Clone)]
pub struct SimulatedWalkConfig {
    pub start: Coordinate,
    /// Time between fixes.
    pub interval: Duration,
    /// Distance walked between fixes, before noise.
    pub step_meters: f64,
    /// Radius of uniform noise added to every reported fix.
    pub jitter_meters: f64,
    /// Maximum heading change per fix, radians.
    pub heading_drift: f64,
    /// Fraction of fixes where the walker stands still.
    pub pause_probability: f64,
    pub seed: Option<u64>,
}

impl Default for SimulatedWalkConfig {
    fn default() -> Self {
        Self {
            start: Coordinate::new(12.9716, 77.5946),
            interval: Duration::from_secs(1),
            step_meters: 1.4,
            jitter_meters: 1.0,
            heading_drift: 0.35,
            pause_probability: 0.1,
            seed: None,
        }
    }
}

/// Random walk producing fixes on a timer, for demos and soak runs.
pub struct SimulatedWalk {
    config: SimulatedWalkConfig,
}

impl SimulatedWalk {
    pub fn new(config: SimulatedWalkConfig) -> Self {
        Self { config }
    }
}

struct Walker {
    position: Coordinate,
    heading: f64,
    rng: StdRng,
}

impl Walker {
    fn step(&mut self, config: &SimulatedWalkConfig) -> Coordinate {
        if !self.rng.gen_bool(config.pause_probability.clamp(0.0, 1.0)) {
            if config.heading_drift > 0.0 {
                self.heading += self.rng.gen_range(-config.heading_drift..=config.heading_drift);
            }
            self.position = offset(self.position, config.step_meters, self.heading);
        }

        if config.jitter_meters <= 0.0 {
            return self.position;
        }
        let noise_bearing = self.rng.gen_range(0.0..2.0 * PI);
        let noise = self.rng.gen_range(0.0..=config.jitter_meters);
        offset(self.position, noise, noise_bearing)
    }
}

/// Moves `meters` along `bearing` (radians clockwise from north) on a local
/// flat approximation.
fn offset(from: Coordinate, meters: f64, bearing: f64) -> Coordinate {
    let d_lat = meters * bearing.cos() / METERS_PER_DEGREE_LAT;
    let d_lng = meters * bearing.sin() / (METERS_PER_DEGREE_LAT * from.lat.to_radians().cos());
    Coordinate::new(from.lat + d_lat, from.lng + d_lng)
}

#[async_trait]
impl GeolocationSource for SimulatedWalk {
    fn permission_state(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn watch(&self) -> PositionWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = self.config.clone();
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let heading = rng.gen_range(0.0..2.0 * PI);
        let mut walker = Walker {
            position: config.start,
            heading,
            rng,
        };

        tokio::spawn(async move {
            if tx
                .send(GeoUpdate::Permission(PermissionState::Granted))
                .is_err()
            {
                return;
            }
            if tx.send(GeoUpdate::Position(config.start)).is_err() {
                return;
            }

            let mut ticker = tokio::time::interval(config.interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let fix = walker.step(&config);
                if tx.send(GeoUpdate::Position(fix)).is_err() {
                    log_debug!("simulated walk watcher dropped");
                    break;
                }
            }
        });

        rx
    }

    async fn current_position(&self) -> Result<Coordinate, GeolocationError> {
        Ok(self.config.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::haversine_m;

    #[tokio::test(start_paused = true)]
    async fn emits_a_fix_per_interval_near_the_start() {
        let source = SimulatedWalk::new(SimulatedWalkConfig {
            seed: Some(7),
            ..SimulatedWalkConfig::default()
        });
        let mut watch = source.watch().await;

        assert_eq!(
            watch.recv().await,
            Some(GeoUpdate::Permission(PermissionState::Granted))
        );

        let mut fixes = Vec::new();
        while fixes.len() < 10 {
            if let Some(GeoUpdate::Position(position)) = watch.recv().await {
                fixes.push(position);
            }
        }

        assert_eq!(fixes[0], Coordinate::new(12.9716, 77.5946));
        let start = fixes[0];
        for fix in &fixes {
            assert!(fix.is_valid());
            // 9 steps of 1.4 m plus 1 m of noise at most
            assert!(haversine_m(&start, fix) < 14.0);
        }
    }

    #[test]
    fn offset_moves_the_requested_distance() {
        let start = Coordinate::new(45.0, 7.0);
        let moved = offset(start, 100.0, PI / 2.0);
        let distance = haversine_m(&start, &moved);
        assert!((distance - 100.0).abs() < 1.0, "{distance}");
    }
}
