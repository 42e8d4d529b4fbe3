//! Shared mocks and builders for the integration tests.

#![allow(dead_code)]

pub mod fixtures;
pub mod osrm_dataset;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use jiff::civil::{Date, date};
use parking_lot::Mutex;

use distribution_planner::cache::InMemoryGeocodeCache;
use distribution_planner::error::{GeocodeError, RoutingError};
use distribution_planner::geocoding::{GeocodingConfig, GeocodingGateway};
use distribution_planner::haversine::{HaversineMatrix, great_circle_km};
use distribution_planner::model::{Coordinate, CostMode};
use distribution_planner::planner::{DistributionPlanner, PlannerOptions};
use distribution_planner::retry::RetryPolicy;
use distribution_planner::sequencer::{RouteSequencer, SequenceOptions};
use distribution_planner::traits::{GeocodeMatch, Geocoder, OptimizedOrder, RoutingService, TravelCost};

use fixtures::Location;

pub fn plan_date() -> Date {
    date(2026, 10, 19)
}

/// Geocoder backed by a fixed address book. Unknown addresses are not
/// found; scripted errors are returned before the address book is used.
#[derive(Default)]
pub struct FakeGeocoder {
    known: HashMap<String, Coordinate>,
    scripted: Mutex<HashMap<String, VecDeque<GeocodeError>>>,
    calls: AtomicUsize,
    calls_by_address: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl FakeGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locations(locations: &[Location]) -> Self {
        locations
            .iter()
            .fold(Self::new(), |geocoder, location| geocoder.with(location.name, location.lat, location.lng))
    }

    pub fn with(mut self, address: &str, lat: f64, lng: f64) -> Self {
        self.known
            .insert(address.to_string(), Coordinate::new(lat, lng).unwrap());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues `error` for the next request for `address`.
    pub fn fail_next(&self, address: &str, error: GeocodeError) {
        self.scripted
            .lock()
            .entry(address.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, address: &str) -> usize {
        self.calls_by_address.lock().get(address).copied().unwrap_or(0)
    }
}

impl Geocoder for FakeGeocoder {
    fn geocode(&self, address: &str) -> Result<GeocodeMatch, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_address
            .lock()
            .entry(address.to_string())
            .or_default() += 1;

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if let Some(error) = self
            .scripted
            .lock()
            .get_mut(address)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        match self.known.get(address) {
            Some(coordinate) => Ok(GeocodeMatch {
                coordinate: *coordinate,
                formatted_address: format!("{address}, Las Vegas, NV"),
                confidence: 0.9,
            }),
            None => Err(GeocodeError::NotFound(address.to_string())),
        }
    }
}

/// Routing collaborator that is always down.
#[derive(Default)]
pub struct FailingRouter {
    calls: AtomicUsize,
}

impl FailingRouter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RoutingService for FailingRouter {
    fn optimize_order(&self, _: &[Coordinate], _: CostMode) -> Result<OptimizedOrder, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RoutingError::Api {
            code: "NoTrips".to_string(),
            message: "service unavailable".to_string(),
        })
    }

    fn distance_matrix(&self, _: &[Coordinate], _: &[Coordinate]) -> Result<Vec<Vec<TravelCost>>, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RoutingError::Unreachable)
    }
}

/// Routing collaborator that keeps the first stop and visits the rest in
/// reverse input order, with straight-line legs at 30 km/h.
pub struct ReversingRouter;

impl ReversingRouter {
    fn leg(from: Coordinate, to: Coordinate) -> TravelCost {
        let distance_km = great_circle_km(from, to);
        TravelCost {
            distance_km,
            duration_min: distance_km * 2.0,
        }
    }
}

impl RoutingService for ReversingRouter {
    fn optimize_order(&self, waypoints: &[Coordinate], _: CostMode) -> Result<OptimizedOrder, RoutingError> {
        let mut order = vec![0];
        order.extend((1..waypoints.len()).rev());
        let legs = order
            .windows(2)
            .map(|pair| Self::leg(waypoints[pair[0]], waypoints[pair[1]]))
            .collect();
        Ok(OptimizedOrder { order, legs })
    }

    fn distance_matrix(
        &self,
        origins: &[Coordinate],
        destinations: &[Coordinate],
    ) -> Result<Vec<Vec<TravelCost>>, RoutingError> {
        Ok(origins
            .iter()
            .map(|from| destinations.iter().map(|to| Self::leg(*from, *to)).collect())
            .collect())
    }
}

/// Answers like [`ReversingRouter`], but stalls for `delay` before any
/// request touching a waypoint north of `stall_north_of`.
pub struct StallingRouter {
    pub stall_north_of: f64,
    pub delay: Duration,
}

impl StallingRouter {
    fn pause_for(&self, waypoints: &[Coordinate]) {
        if waypoints.iter().any(|point| point.latitude() > self.stall_north_of) {
            std::thread::sleep(self.delay);
        }
    }
}

impl RoutingService for StallingRouter {
    fn optimize_order(&self, waypoints: &[Coordinate], mode: CostMode) -> Result<OptimizedOrder, RoutingError> {
        self.pause_for(waypoints);
        ReversingRouter.optimize_order(waypoints, mode)
    }

    fn distance_matrix(
        &self,
        origins: &[Coordinate],
        destinations: &[Coordinate],
    ) -> Result<Vec<Vec<TravelCost>>, RoutingError> {
        self.pause_for(origins);
        ReversingRouter.distance_matrix(origins, destinations)
    }
}

/// Fast settings for tests: generous rate, no real backoff.
pub fn test_geocoding_config() -> GeocodingConfig {
    GeocodingConfig {
        requests_per_sec: 10_000.0,
        burst: 100,
        max_in_flight: 4,
        retry: RetryPolicy::exponential(3, Duration::from_millis(1), Duration::from_millis(5)),
        ..GeocodingConfig::default()
    }
}

pub fn gateway_with(geocoder: Arc<FakeGeocoder>, config: &GeocodingConfig) -> GeocodingGateway {
    GeocodingGateway::new(
        geocoder,
        Arc::new(InMemoryGeocodeCache::new()),
        config.limiter().unwrap(),
        config,
    )
    .unwrap()
}

pub fn planner_with(
    geocoder: Arc<FakeGeocoder>,
    routing: Option<Arc<dyn RoutingService>>,
    options: PlannerOptions,
) -> DistributionPlanner {
    let gateway = gateway_with(geocoder, &test_geocoding_config());
    let sequencer = RouteSequencer::new(routing, HaversineMatrix::default(), SequenceOptions::default());
    DistributionPlanner::new(Arc::new(gateway), sequencer, options)
}

pub fn local_planner(geocoder: Arc<FakeGeocoder>) -> DistributionPlanner {
    planner_with(geocoder, None, PlannerOptions::default())
}
