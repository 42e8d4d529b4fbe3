//! OSRM HTTP adapter for waypoint ordering (`trip`) and cost matrices (`table`).

use serde::Deserialize;
use tracing::debug;

use crate::error::RoutingError;
use crate::model::{Coordinate, CostMode};
use crate::traits::{OptimizedOrder, RoutingService, TravelCost};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn url(&self, service: &str, coordinates: &[Coordinate]) -> String {
        let coords = coordinates
            .iter()
            .map(|coordinate| format!("{:.6},{:.6}", coordinate.longitude(), coordinate.latitude()))
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}/{}/v1/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            service,
            self.config.profile,
            coords
        )
    }
}

impl RoutingService for OsrmClient {
    /// OSRM only supports open trips with a fixed destination, so the trip
    /// is requested as a round trip from the first waypoint and the closing
    /// leg back to the start is dropped.
    fn optimize_order(
        &self,
        waypoints: &[Coordinate],
        mode: CostMode,
    ) -> Result<OptimizedOrder, RoutingError> {
        if waypoints.len() < 2 {
            return Ok(OptimizedOrder {
                order: (0..waypoints.len()).collect(),
                legs: Vec::new(),
            });
        }

        // OSRM always optimizes its own weight (duration for the car profile).
        debug!(?mode, waypoints = waypoints.len(), "requesting OSRM trip");

        let response: OsrmTripResponse = self
            .client
            .get(self.url("trip", waypoints))
            .query(&[
                ("source", "first"),
                ("roundtrip", "true"),
                ("overview", "false"),
                ("steps", "false"),
            ])
            .send()
            .and_then(|resp| resp.json::<OsrmTripResponse>())?;

        trip_to_order(response, waypoints.len())
    }

    fn distance_matrix(
        &self,
        origins: &[Coordinate],
        destinations: &[Coordinate],
    ) -> Result<Vec<Vec<TravelCost>>, RoutingError> {
        if origins.is_empty() || destinations.is_empty() {
            return Ok(Vec::new());
        }

        let mut coordinates = origins.to_vec();
        coordinates.extend_from_slice(destinations);
        let sources = (0..origins.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");
        let targets = (origins.len()..coordinates.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");

        let response: OsrmTableResponse = self
            .client
            .get(self.url("table", &coordinates))
            .query(&[
                ("annotations", "duration,distance"),
                ("sources", sources.as_str()),
                ("destinations", targets.as_str()),
            ])
            .send()
            .and_then(|resp| resp.json::<OsrmTableResponse>())?;

        table_to_costs(response, origins.len(), destinations.len())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsrmTripResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    waypoints: Vec<OsrmTripWaypoint>,
    #[serde(default)]
    trips: Vec<OsrmTrip>,
}

#[derive(Debug, Deserialize)]
struct OsrmTripWaypoint {
    waypoint_index: usize,
    trips_index: usize,
}

#[derive(Debug, Deserialize)]
struct OsrmTrip {
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    /// meters
    distance: f64,
    /// seconds
    duration: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsrmTableResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    durations: Option<Vec<Vec<Option<f64>>>>,
    distances: Option<Vec<Vec<Option<f64>>>>,
}

fn api_error(code: String, message: Option<String>) -> RoutingError {
    RoutingError::Api {
        code,
        message: message.unwrap_or_default(),
    }
}

pub(crate) fn trip_to_order(
    response: OsrmTripResponse,
    waypoint_count: usize,
) -> Result<OptimizedOrder, RoutingError> {
    if response.code != "Ok" {
        return Err(api_error(response.code, response.message));
    }
    if response.trips.len() != 1 {
        // several trips means the waypoints are not mutually reachable
        return Err(RoutingError::Unreachable);
    }
    if response.waypoints.len() != waypoint_count {
        return Err(RoutingError::InvalidResponse(format!(
            "{} waypoints returned for {} submitted",
            response.waypoints.len(),
            waypoint_count
        )));
    }

    let mut order = vec![usize::MAX; waypoint_count];
    for (input_index, waypoint) in response.waypoints.iter().enumerate() {
        let position = waypoint.waypoint_index;
        if waypoint.trips_index != 0 || position >= waypoint_count || order[position] != usize::MAX {
            return Err(RoutingError::InvalidResponse(format!(
                "waypoint {input_index} has invalid trip position {position}"
            )));
        }
        order[position] = input_index;
    }

    let trip = &response.trips[0];
    if trip.legs.len() < waypoint_count.saturating_sub(1) {
        return Err(RoutingError::InvalidResponse(format!(
            "{} legs for {} waypoints",
            trip.legs.len(),
            waypoint_count
        )));
    }

    let legs = trip
        .legs
        .iter()
        .take(waypoint_count.saturating_sub(1))
        .map(|leg| TravelCost {
            distance_km: leg.distance / 1000.0,
            duration_min: leg.duration / 60.0,
        })
        .collect();

    Ok(OptimizedOrder { order, legs })
}

pub(crate) fn table_to_costs(
    response: OsrmTableResponse,
    rows: usize,
    columns: usize,
) -> Result<Vec<Vec<TravelCost>>, RoutingError> {
    if response.code != "Ok" {
        return Err(api_error(response.code, response.message));
    }

    let durations = response
        .durations
        .ok_or_else(|| RoutingError::InvalidResponse("missing durations".to_string()))?;
    let distances = response
        .distances
        .ok_or_else(|| RoutingError::InvalidResponse("missing distances".to_string()))?;

    if durations.len() != rows || distances.len() != rows {
        return Err(RoutingError::InvalidResponse(format!(
            "table has {} rows, expected {}",
            durations.len(),
            rows
        )));
    }

    durations
        .into_iter()
        .zip(distances)
        .map(|(duration_row, distance_row)| {
            if duration_row.len() != columns || distance_row.len() != columns {
                return Err(RoutingError::InvalidResponse(format!(
                    "table row has {} columns, expected {}",
                    duration_row.len(),
                    columns
                )));
            }
            duration_row
                .into_iter()
                .zip(distance_row)
                .map(|(duration, distance)| match (duration, distance) {
                    (Some(duration), Some(distance)) => Ok(TravelCost {
                        distance_km: distance / 1000.0,
                        duration_min: duration / 60.0,
                    }),
                    _ => Err(RoutingError::Unreachable),
                })
                .collect()
        })
        .collect()
}
