//! Contracts for the collaborators the planner consumes.
//!
//! The planner owns none of these services. Concrete adapters live in
//! `nominatim`, `osrm`, `cache`, `jobs` and `directory`; tests substitute
//! in-memory fakes.

use serde::{Deserialize, Serialize};

use crate::cache::GeocodeEntry;
use crate::error::{GeocodeError, RoutingError};
use crate::jobs::{JobHandle, JobStatus, PlanTask};
use crate::model::{ClientPoint, Coordinate, CostMode};
use crate::retry::RetryPolicy;

/// Best-ranked match for an address, with the payload kept for downstream
/// validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeMatch {
    pub coordinate: Coordinate,
    pub formatted_address: String,
    pub confidence: f64,
}

/// Resolves one free-form address.
pub trait Geocoder: Send + Sync {
    fn geocode(&self, address: &str) -> Result<GeocodeMatch, GeocodeError>;
}

/// Process-wide geocode cache keyed by normalized address.
///
/// Implementations must be safe under concurrent get/put. Lost updates are
/// acceptable (last write wins); torn entries are not.
pub trait GeocodeCache: Send + Sync {
    /// Returns the entry only while it is fresh.
    fn get(&self, key: &str) -> Option<GeocodeEntry>;

    fn put(&self, entry: GeocodeEntry);

    /// Drops an entry, e.g. after the address changed upstream. Returns
    /// whether something was removed.
    fn invalidate(&self, key: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelCost {
    pub distance_km: f64,
    pub duration_min: f64,
}

/// Visiting order returned by a routing collaborator.
///
/// `order` holds indices into the submitted waypoints; `legs[i]` is the
/// segment from `order[i]` to `order[i + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedOrder {
    pub order: Vec<usize>,
    pub legs: Vec<TravelCost>,
}

pub trait RoutingService: Send + Sync {
    fn optimize_order(
        &self,
        waypoints: &[Coordinate],
        mode: CostMode,
    ) -> Result<OptimizedOrder, RoutingError>;

    /// Road-network costs indexed `[origin][destination]`.
    fn distance_matrix(
        &self,
        origins: &[Coordinate],
        destinations: &[Coordinate],
    ) -> Result<Vec<Vec<TravelCost>>, RoutingError>;
}

/// Background execution with bounded retries and a polling handle.
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, task: PlanTask, retry: RetryPolicy) -> JobHandle;

    /// `None` for handles never issued or whose finished status has
    /// been evicted.
    fn poll(&self, handle: &JobHandle) -> Option<JobStatus>;
}

/// Looks up client records by id. Unknown ids come back as `None`, in
/// input order.
pub trait ClientDirectory: Send + Sync {
    fn lookup(&self, ids: &[String]) -> Vec<Option<ClientPoint>>;
}
