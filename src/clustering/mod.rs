//! Partitioning geocoded points into vehicle-feasible groups.
//!
//! Strategies produce groups of point indices; [`cluster`] then enforces the
//! stop and span bounds by repeated bisection and numbers the final groups.
//! Every input point ends up in exactly one cluster.

pub mod density;
pub mod partition;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PlanError;
use crate::haversine::great_circle_km;
use crate::model::{Cluster, Coordinate, LocationPoint};

pub use density::DensityParams;
pub use partition::PartitionParams;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConstraints {
    pub max_stops: usize,
    pub max_span_km: f64,
}

impl ClusterConstraints {
    pub fn new(max_stops: usize, max_span_km: f64) -> Self {
        Self {
            max_stops,
            max_span_km,
        }
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.max_stops < 1 {
            return Err(PlanError::ClusteringInfeasible(
                "max stops per cluster must be at least 1".to_string(),
            ));
        }
        if !self.max_span_km.is_finite() || self.max_span_km <= 0.0 {
            return Err(PlanError::ClusteringInfeasible(format!(
                "max cluster span must be a positive distance, got {}",
                self.max_span_km
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ClusterStrategy {
    Density(DensityParams),
    Partition(PartitionParams),
}

impl ClusterStrategy {
    pub fn density() -> Self {
        ClusterStrategy::Density(DensityParams::default())
    }

    pub fn partition() -> Self {
        ClusterStrategy::Partition(PartitionParams::default())
    }
}

/// Groups `points` so that no cluster holds more than `max_stops` members
/// or spans more than `max_span_km` corner to corner.
pub fn cluster(
    points: &[LocationPoint],
    constraints: &ClusterConstraints,
    strategy: &ClusterStrategy,
) -> Result<Vec<Cluster>, PlanError> {
    constraints.validate()?;
    if points.is_empty() {
        return Err(PlanError::Input("no points to cluster".to_string()));
    }

    let groups = match strategy {
        ClusterStrategy::Density(params) => density::group(points, constraints, params)?,
        ClusterStrategy::Partition(params) => partition::group(points, constraints, params)?,
    };
    debug!(groups = groups.len(), "strategy grouping done");

    let bounded = enforce_bounds(points, groups, constraints);
    let clusters = number_clusters(points, bounded);

    info!(
        points = points.len(),
        clusters = clusters.len(),
        "clustering complete"
    );

    Ok(clusters)
}

/// Splits groups until every one is within the stop cap and the span.
/// Uses an explicit work queue so pathological inputs cannot exhaust the stack.
fn enforce_bounds(
    points: &[LocationPoint],
    groups: Vec<Vec<usize>>,
    constraints: &ClusterConstraints,
) -> Vec<Vec<usize>> {
    let mut pending: VecDeque<Vec<usize>> = groups.into_iter().filter(|g| !g.is_empty()).collect();
    let mut done = Vec::with_capacity(pending.len());

    while let Some(group) = pending.pop_front() {
        let too_many = group.len() > constraints.max_stops;
        let too_wide = group.len() > 1 && span_km(points, &group) > constraints.max_span_km;

        if too_many || too_wide {
            let (left, right) = bisect(points, group);
            pending.push_back(left);
            pending.push_back(right);
        } else {
            done.push(group);
        }
    }

    done
}

struct Extent {
    min_lat: f64,
    max_lat: f64,
    min_lng: f64,
    max_lng: f64,
}

fn extent(points: &[LocationPoint], group: &[usize]) -> Extent {
    let mut extent = Extent {
        min_lat: f64::INFINITY,
        max_lat: f64::NEG_INFINITY,
        min_lng: f64::INFINITY,
        max_lng: f64::NEG_INFINITY,
    };
    for &index in group {
        let coordinate = points[index].coordinate;
        extent.min_lat = extent.min_lat.min(coordinate.latitude());
        extent.max_lat = extent.max_lat.max(coordinate.latitude());
        extent.min_lng = extent.min_lng.min(coordinate.longitude());
        extent.max_lng = extent.max_lng.max(coordinate.longitude());
    }
    extent
}

fn corner(latitude: f64, longitude: f64) -> Coordinate {
    Coordinate::clamped(latitude, longitude)
}

/// Bounding-box diagonal in kilometers.
pub(crate) fn span_km(points: &[LocationPoint], group: &[usize]) -> f64 {
    let extent = extent(points, group);
    great_circle_km(
        corner(extent.min_lat, extent.min_lng),
        corner(extent.max_lat, extent.max_lng),
    )
}

/// Splits at the median of the axis with the greater extent in kilometers.
fn bisect(points: &[LocationPoint], mut group: Vec<usize>) -> (Vec<usize>, Vec<usize>) {
    let extent = extent(points, &group);
    let mid_lat = (extent.min_lat + extent.max_lat) / 2.0;
    let mid_lng = (extent.min_lng + extent.max_lng) / 2.0;

    let lat_spread = great_circle_km(corner(extent.min_lat, mid_lng), corner(extent.max_lat, mid_lng));
    let lng_spread = great_circle_km(corner(mid_lat, extent.min_lng), corner(mid_lat, extent.max_lng));

    let along_latitude = lat_spread >= lng_spread;
    group.sort_by(|&a, &b| {
        let (ca, cb) = (points[a].coordinate, points[b].coordinate);
        let ordering = if along_latitude {
            ca.latitude().total_cmp(&cb.latitude())
        } else {
            ca.longitude().total_cmp(&cb.longitude())
        };
        ordering.then(a.cmp(&b))
    });

    let right = group.split_off(group.len() / 2);
    (group, right)
}

/// Orders members by input position and clusters by their first member, so
/// identical inputs always get identical cluster ids.
fn number_clusters(points: &[LocationPoint], groups: Vec<Vec<usize>>) -> Vec<Cluster> {
    let mut groups: Vec<Vec<usize>> = groups
        .into_iter()
        .filter(|group| !group.is_empty())
        .map(|mut group| {
            group.sort_unstable();
            group
        })
        .collect();
    groups.sort_by_key(|group| group[0]);

    groups
        .into_iter()
        .enumerate()
        .filter_map(|(cluster_id, group)| {
            let members: Vec<LocationPoint> = group.iter().map(|&i| points[i].clone()).collect();
            let centroid = Coordinate::centroid(members.iter().map(|member| &member.coordinate))?;
            Some(Cluster {
                cluster_id,
                members,
                centroid,
            })
        })
        .collect()
}
