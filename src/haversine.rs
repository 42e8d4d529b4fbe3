//! Haversine travel estimates (fallback when the routing service is unavailable).
//!
//! Uses great-circle distance and an assumed speed to estimate travel time.
//! Less accurate than a road network (ignores roads) but always available.

use crate::distance::TravelCostMatrix;
use crate::error::NonPositiveSetting;
use crate::model::Coordinate;

/// Average driving speed assumption for time estimation.
pub const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates in kilometers.
pub fn great_circle_km(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.latitude().to_radians();
    let lat2_rad = to.latitude().to_radians();
    let delta_lat = (to.latitude() - from.latitude()).to_radians();
    let delta_lng = (to.longitude() - from.longitude()).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Haversine-based travel cost estimator.
#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    /// Assumed average driving speed in km/h, always positive.
    speed_kmh: f64,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineMatrix {
    pub fn new(speed_kmh: f64) -> Result<Self, NonPositiveSetting> {
        let speed_kmh = NonPositiveSetting::check("speed_kmh", speed_kmh)?;
        Ok(Self { speed_kmh })
    }

    /// Convert distance in km to travel time in minutes.
    pub fn km_to_minutes(&self, km: f64) -> f64 {
        km / self.speed_kmh * 60.0
    }

    pub fn matrix_for(&self, locations: &[Coordinate]) -> TravelCostMatrix {
        let n = locations.len();
        let mut distances = vec![0.0; n * n];
        let mut durations = vec![0.0; n * n];

        for (i, from) in locations.iter().enumerate() {
            for (j, to) in locations.iter().enumerate() {
                if i != j {
                    let km = great_circle_km(*from, *to);
                    distances[i * n + j] = km;
                    durations[i * n + j] = self.km_to_minutes(km);
                }
            }
        }

        TravelCostMatrix::from_flat(n, distances, durations)
    }
}
