//! Partition-based grouping: seeded k-means with capacity repair.

use std::hash::Hasher;

use fxhash::FxHasher64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ClusterConstraints;
use crate::error::PlanError;
use crate::haversine::great_circle_km;
use crate::model::{Coordinate, LocationPoint};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionParams {
    /// Target cluster count. Derived as `ceil(points / max_stops)` when absent.
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_max_iterations() -> usize {
    100
}

impl Default for PartitionParams {
    fn default() -> Self {
        Self {
            k: None,
            max_iterations: default_max_iterations(),
        }
    }
}

pub(crate) fn group(
    points: &[LocationPoint],
    constraints: &ClusterConstraints,
    params: &PartitionParams,
) -> Result<Vec<Vec<usize>>, PlanError> {
    if params.k == Some(0) {
        return Err(PlanError::ClusteringInfeasible(
            "partition cluster count must be at least 1".to_string(),
        ));
    }

    let n = points.len();
    let k = params
        .k
        .unwrap_or_else(|| n.div_ceil(constraints.max_stops))
        .clamp(1, n);

    let mut rng = StdRng::seed_from_u64(seed_for(points));
    let mut centroids = initial_centroids(points, k, &mut rng);
    let mut assignments = vec![usize::MAX; n];

    let mut iterations = 0;
    loop {
        let changed = assign(points, &centroids, &mut assignments);
        iterations += 1;
        recompute_centroids(points, &assignments, &mut centroids);
        if !changed || iterations >= params.max_iterations.max(1) {
            break;
        }
    }
    debug!(k, iterations, "k-means settled");

    repair_capacity(points, &mut assignments, &mut centroids, constraints.max_stops);

    let mut groups = vec![Vec::new(); centroids.len()];
    for (index, &cluster) in assignments.iter().enumerate() {
        groups[cluster].push(index);
    }
    groups.retain(|group| !group.is_empty());

    Ok(groups)
}

/// Stable seed derived from the input, so equal inputs cluster equally.
fn seed_for(points: &[LocationPoint]) -> u64 {
    let mut hasher = FxHasher64::default();
    hasher.write_usize(points.len());
    for point in points {
        hasher.write(point.id.as_bytes());
        hasher.write_u64(point.coordinate.latitude().to_bits());
        hasher.write_u64(point.coordinate.longitude().to_bits());
    }
    hasher.finish()
}

/// k-means++ seeding: each further centroid is drawn with probability
/// proportional to the squared distance from the closest chosen one.
fn initial_centroids(points: &[LocationPoint], k: usize, rng: &mut StdRng) -> Vec<Coordinate> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.random_range(0..points.len())].coordinate);

    let mut nearest: Vec<f64> = points
        .iter()
        .map(|point| great_circle_km(point.coordinate, centroids[0]).powi(2))
        .collect();

    while centroids.len() < k {
        let total: f64 = nearest.iter().sum();
        let chosen = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            let mut chosen = points.len() - 1;
            for (index, weight) in nearest.iter().enumerate() {
                cumulative += weight;
                if *weight > 0.0 && cumulative >= target {
                    chosen = index;
                    break;
                }
            }
            chosen
        } else {
            rng.random_range(0..points.len())
        };

        let centroid = points[chosen].coordinate;
        centroids.push(centroid);
        for (point, distance) in points.iter().zip(nearest.iter_mut()) {
            *distance = distance.min(great_circle_km(point.coordinate, centroid).powi(2));
        }
    }

    centroids
}

fn nearest_centroid(coordinate: Coordinate, centroids: &[Coordinate]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = great_circle_km(coordinate, *centroid);
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}

fn assign(points: &[LocationPoint], centroids: &[Coordinate], assignments: &mut [usize]) -> bool {
    let mut changed = false;
    for (point, assignment) in points.iter().zip(assignments.iter_mut()) {
        let nearest = nearest_centroid(point.coordinate, centroids);
        if *assignment != nearest {
            *assignment = nearest;
            changed = true;
        }
    }
    changed
}

/// Empty clusters keep their previous centroid.
fn recompute_centroids(points: &[LocationPoint], assignments: &[usize], centroids: &mut [Coordinate]) {
    for (cluster, centroid) in centroids.iter_mut().enumerate() {
        let members = points
            .iter()
            .zip(assignments)
            .filter(|(_, assigned)| **assigned == cluster)
            .map(|(point, _)| &point.coordinate);
        if let Some(mean) = Coordinate::centroid(members) {
            *centroid = mean;
        }
    }
}

/// Moves the furthest members of over-full clusters to the nearest cluster
/// with room, opening a new cluster when none has room.
fn repair_capacity(
    points: &[LocationPoint],
    assignments: &mut [usize],
    centroids: &mut Vec<Coordinate>,
    max_stops: usize,
) {
    let mut sizes = vec![0usize; centroids.len()];
    for &cluster in assignments.iter() {
        sizes[cluster] += 1;
    }

    let mut cluster = 0;
    while cluster < centroids.len() {
        if sizes[cluster] <= max_stops {
            cluster += 1;
            continue;
        }

        let mut members: Vec<usize> = (0..points.len())
            .filter(|&index| assignments[index] == cluster)
            .collect();
        let centroid = centroids[cluster];
        members.sort_by(|&a, &b| {
            let da = great_circle_km(points[a].coordinate, centroid);
            let db = great_circle_km(points[b].coordinate, centroid);
            db.total_cmp(&da).then(a.cmp(&b))
        });

        let excess = sizes[cluster] - max_stops;
        for &index in members.iter().take(excess) {
            let coordinate = points[index].coordinate;
            let target = (0..centroids.len())
                .filter(|&other| other != cluster && sizes[other] < max_stops)
                .min_by(|&a, &b| {
                    great_circle_km(coordinate, centroids[a])
                        .total_cmp(&great_circle_km(coordinate, centroids[b]))
                        .then(a.cmp(&b))
                });

            let target = match target {
                Some(target) => target,
                None => {
                    centroids.push(coordinate);
                    sizes.push(0);
                    centroids.len() - 1
                }
            };

            assignments[index] = target;
            sizes[cluster] -= 1;
            sizes[target] += 1;
        }

        cluster += 1;
    }

    recompute_centroids(points, assignments, centroids);
}
