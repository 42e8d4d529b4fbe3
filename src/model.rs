//! Planning data model.
//!
//! Everything here except the geocode cache entries is created fresh for a
//! single planning invocation and discarded once the plan is assembled.

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, InvalidCoordinate};

/// A WGS84 position. Construction validates the range, so a `Coordinate`
/// in hand is always within [-90,90]×[-180,180].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = InvalidCoordinate;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinate> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);

        if valid {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }

    /// Clamps into range instead of failing. For values derived from
    /// already-valid coordinates (extents, midpoints).
    pub(crate) fn clamped(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: latitude.clamp(-90.0, 90.0),
            longitude: longitude.clamp(-180.0, 180.0),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Mean position of a set of coordinates. Returns `None` for an empty set.
    pub fn centroid<'a>(coordinates: impl IntoIterator<Item = &'a Coordinate>) -> Option<Self> {
        let mut count = 0usize;
        let mut lat_sum = 0.0;
        let mut lng_sum = 0.0;
        for coordinate in coordinates {
            count += 1;
            lat_sum += coordinate.latitude;
            lng_sum += coordinate.longitude;
        }

        if count == 0 {
            return None;
        }

        // The mean of in-range values is in range.
        Some(Self {
            latitude: lat_sum / count as f64,
            longitude: lng_sum / count as f64,
        })
    }
}

/// A client as handed to the planner: an id, an address, and coordinates
/// when an earlier run already resolved them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPoint {
    pub id: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
    #[serde(default)]
    pub weight: f64,
}

impl ClientPoint {
    pub fn with_address(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: Some(address.into()),
            coordinate: None,
            weight: 0.0,
        }
    }

    pub fn with_coordinate(id: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            id: id.into(),
            address: None,
            coordinate: Some(coordinate),
            weight: 0.0,
        }
    }
}

/// A geocoded stop. `id` refers back to the originating client record,
/// which the clustering and sequencing core never touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPoint {
    pub id: String,
    pub coordinate: Coordinate,
    /// Capacity-consuming quantity such as load tonnage. Unused by the
    /// current strategies.
    pub weight: f64,
}

impl LocationPoint {
    pub fn new(id: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            id: id.into(),
            coordinate,
            weight: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub cluster_id: usize,
    pub members: Vec<LocationPoint>,
    pub centroid: Coordinate,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.members.iter().map(|member| member.coordinate).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMode {
    #[default]
    Distance,
    Duration,
    Balanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leg {
    pub from_id: String,
    pub to_id: String,
    pub distance_km: f64,
    pub duration_min: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencedRoute {
    pub cluster_id: usize,
    pub ordered_member_ids: Vec<String>,
    pub legs: Vec<Leg>,
    pub total_distance_km: f64,
    pub total_duration_min: f64,
    /// `false` means the local heuristic produced this order.
    pub used_external_routing: bool,
}

impl SequencedRoute {
    pub(crate) fn from_legs(
        cluster_id: usize,
        ordered_member_ids: Vec<String>,
        legs: Vec<Leg>,
        used_external_routing: bool,
    ) -> Self {
        let total_distance_km = legs.iter().map(|leg| leg.distance_km).sum();
        let total_duration_min = legs.iter().map(|leg| leg.duration_min).sum();
        Self {
            cluster_id,
            ordered_member_ids,
            legs,
            total_distance_km,
            total_duration_min,
            used_external_routing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum UnassignedReason {
    GeocodingFailed { kind: FailureKind, reason: String },
    UnknownClient,
    DeadlineExceeded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "warning")]
pub enum PlanWarning {
    Unassigned {
        id: String,
        reason: UnassignedReason,
    },
    #[serde(rename_all = "camelCase")]
    LocalHeuristic { cluster_id: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionPlan {
    pub plan_id: String,
    pub date: Date,
    pub routes: Vec<SequencedRoute>,
    pub unassigned_ids: Vec<String>,
    pub warnings: Vec<PlanWarning>,
}

impl DistributionPlan {
    /// True when some points are unassigned or some route fell back to the
    /// local heuristic.
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn total_distance_km(&self) -> f64 {
        self.routes.iter().map(|route| route.total_distance_km).sum()
    }

    pub fn total_duration_min(&self) -> f64 {
        self.routes.iter().map(|route| route.total_duration_min).sum()
    }
}
