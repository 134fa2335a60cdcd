use serde::{Deserialize, Serialize};

/// Mean Earth radius used for all great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside the latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Longitude-first pair, the order map layers expect for path vertices.
    pub fn to_lng_lat(&self) -> [f64; 2] {
        [self.lng, self.lat]
    }

    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_m(self, other)
    }
}

/// Great-circle distance in meters.
pub fn haversine_m(from: &Coordinate, to: &Coordinate) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn hundredth_of_a_degree_north_is_about_1112_meters() {
        let a = Coordinate::new(12.9716, 77.5946);
        let b = Coordinate::new(12.9816, 77.5946);
        assert_relative_eq!(haversine_m(&a, &b), 1_111.95, epsilon = 1.0);
    }

    #[test]
    fn hundredth_of_a_degree_east_shrinks_with_latitude() {
        let a = Coordinate::new(12.9716, 77.5946);
        let b = Coordinate::new(12.9716, 77.6046);
        // cos(12.97°) of the meridional figure
        assert_relative_eq!(haversine_m(&a, &b), 1_083.6, epsilon = 1.0);
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        let a = Coordinate::new(51.5007, -0.1246);
        let b = Coordinate::new(48.8584, 2.2945);
        assert_eq!(haversine_m(&a, &a), 0.0);
        assert_relative_eq!(haversine_m(&a, &b), haversine_m(&b, &a), epsilon = 1e-6);
        assert_relative_eq!(haversine_m(&a, &b), 340_000.0, max_relative = 0.01);
    }

    #[test]
    fn rejects_non_finite_and_out_of_range() {
        assert!(Coordinate::new(12.0, 77.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 77.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -180.5).is_valid());
    }

    #[test]
    fn path_vertices_are_longitude_first() {
        assert_eq!(Coordinate::new(1.5, 2.5).to_lng_lat(), [2.5, 1.5]);
    }
}
