//! Visiting order within a cluster.
//!
//! The external routing service is asked first. When it is absent, fails,
//! or answers with something that is not a permutation of the members, the
//! route is built locally: nearest neighbor from the first member, then
//! 2-opt passes over the open path. Past a deadline nothing calls out and
//! the heuristic runs on great-circle estimates.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::distance::{DistanceEstimator, MatrixSource, TravelCostMatrix};
use crate::haversine::{HaversineMatrix, great_circle_km};
use crate::model::{Cluster, CostMode, Leg, SequencedRoute};
use crate::traits::{OptimizedOrder, RoutingService};

#[derive(Debug, Clone)]
pub struct SequenceOptions {
    /// Upper bound on full 2-opt passes. Each pass is O(n²).
    pub max_two_opt_passes: usize,
    /// Ask the routing service for a road matrix before falling back to
    /// great-circle estimates in the local heuristic.
    pub road_matrix_fallback: bool,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            max_two_opt_passes: 4,
            road_matrix_fallback: true,
        }
    }
}

#[derive(Clone)]
pub struct RouteSequencer {
    routing: Option<Arc<dyn RoutingService>>,
    estimator: DistanceEstimator,
    options: SequenceOptions,
}

impl RouteSequencer {
    pub fn new(
        routing: Option<Arc<dyn RoutingService>>,
        haversine: HaversineMatrix,
        options: SequenceOptions,
    ) -> Self {
        let estimator = if options.road_matrix_fallback {
            DistanceEstimator::new(haversine, routing.clone())
        } else {
            DistanceEstimator::great_circle_only(haversine)
        };

        Self {
            routing,
            estimator,
            options,
        }
    }

    /// Sequencer that never calls out; every route comes from the heuristic.
    pub fn local_only(haversine: HaversineMatrix, options: SequenceOptions) -> Self {
        Self::new(None, haversine, options)
    }

    pub fn sequence(&self, cluster: &Cluster, mode: CostMode) -> SequencedRoute {
        self.sequence_until(cluster, mode, None)
    }

    /// Sequences `cluster`, skipping every external call once `deadline`
    /// has passed.
    pub fn sequence_until(&self, cluster: &Cluster, mode: CostMode, deadline: Option<Instant>) -> SequencedRoute {
        let ids: Vec<String> = cluster.members.iter().map(|member| member.id.clone()).collect();
        let expired = || deadline.is_some_and(|deadline| Instant::now() >= deadline);

        if cluster.len() <= 1 {
            return SequencedRoute::from_legs(cluster.cluster_id, ids, Vec::new(), false);
        }

        if let Some(routing) = self.routing.as_ref().filter(|_| !expired()) {
            match routing.optimize_order(&cluster.coordinates(), mode) {
                Ok(optimized) => match external_route(cluster.cluster_id, &ids, optimized) {
                    Some(route) => {
                        debug!(cluster_id = cluster.cluster_id, stops = ids.len(), "sequenced by routing service");
                        return route;
                    }
                    None => warn!(
                        cluster_id = cluster.cluster_id,
                        "routing service returned an inconsistent order, using local heuristic"
                    ),
                },
                Err(err) => warn!(
                    cluster_id = cluster.cluster_id,
                    error = %err,
                    "routing service failed, using local heuristic"
                ),
            }
        }

        self.local_route(cluster, &ids, mode, expired())
    }

    fn local_route(&self, cluster: &Cluster, ids: &[String], mode: CostMode, expired: bool) -> SequencedRoute {
        let coordinates = cluster.coordinates();
        let (matrix, source) = if expired {
            debug!(cluster_id = cluster.cluster_id, "deadline passed, skipping road matrix");
            (self.estimator.great_circle(&coordinates), MatrixSource::GreatCircle)
        } else {
            self.estimator.matrix_for(&coordinates)
        };

        let mut order = nearest_neighbor(cluster);
        let passes = two_opt(&mut order, &matrix, mode, self.options.max_two_opt_passes);

        let input_order: Vec<usize> = (0..ids.len()).collect();
        if matrix.path_cost(&input_order, mode) < matrix.path_cost(&order, mode) {
            order = input_order;
        }

        debug!(
            cluster_id = cluster.cluster_id,
            stops = ids.len(),
            passes,
            road_network = source == MatrixSource::RoadNetwork,
            "sequenced by local heuristic"
        );

        let legs = order
            .windows(2)
            .map(|pair| Leg {
                from_id: ids[pair[0]].clone(),
                to_id: ids[pair[1]].clone(),
                distance_km: matrix.distance_km(pair[0], pair[1]),
                duration_min: matrix.duration_min(pair[0], pair[1]),
            })
            .collect();
        let ordered = order.iter().map(|&index| ids[index].clone()).collect();

        SequencedRoute::from_legs(cluster.cluster_id, ordered, legs, false)
    }
}

/// Adopts the service's order verbatim, provided it is a permutation of
/// the members with one finite leg between consecutive stops.
fn external_route(cluster_id: usize, ids: &[String], optimized: OptimizedOrder) -> Option<SequencedRoute> {
    let n = ids.len();
    if optimized.order.len() != n || optimized.legs.len() != n - 1 {
        return None;
    }

    let mut seen = vec![false; n];
    for &index in &optimized.order {
        if index >= n || seen[index] {
            return None;
        }
        seen[index] = true;
    }

    let mut legs = Vec::with_capacity(n - 1);
    for (pair, cost) in optimized.order.windows(2).zip(&optimized.legs) {
        if !cost.distance_km.is_finite() || !cost.duration_min.is_finite() {
            return None;
        }
        legs.push(Leg {
            from_id: ids[pair[0]].clone(),
            to_id: ids[pair[1]].clone(),
            distance_km: cost.distance_km,
            duration_min: cost.duration_min,
        });
    }

    let ordered = optimized.order.iter().map(|&index| ids[index].clone()).collect();
    Some(SequencedRoute::from_legs(cluster_id, ordered, legs, true))
}

/// Greedy tour from the first member by great-circle distance. Ties go to
/// the lower member index.
fn nearest_neighbor(cluster: &Cluster) -> Vec<usize> {
    let n = cluster.len();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);

    let mut current = 0;
    visited[0] = true;
    order.push(0);

    while order.len() < n {
        let here = cluster.members[current].coordinate;
        let mut next = None;
        let mut best = f64::INFINITY;
        for (index, member) in cluster.members.iter().enumerate() {
            if visited[index] {
                continue;
            }
            let distance = great_circle_km(here, member.coordinate);
            if distance < best {
                best = distance;
                next = Some(index);
            }
        }

        let Some(next) = next else { break };
        visited[next] = true;
        order.push(next);
        current = next;
    }

    order
}

/// 2-opt over an open path with a fixed start. Reversing `order[i+1..=j]`
/// replaces edges (i, i+1) and (j, j+1) with (i, j) and (i+1, j+1); the
/// last stop has no outgoing edge. Returns the number of passes run.
fn two_opt(order: &mut [usize], matrix: &TravelCostMatrix, mode: CostMode, max_passes: usize) -> usize {
    let n = order.len();
    if n < 3 {
        return 0;
    }

    let edge = |a: usize, b: usize| matrix.symmetric_cost(a, b, mode);
    let mut passes = 0;

    while passes < max_passes {
        passes += 1;
        let mut improved = false;

        for i in 0..n - 2 {
            for j in i + 2..n {
                let mut before = edge(order[i], order[i + 1]);
                let mut after = edge(order[i], order[j]);
                if j + 1 < n {
                    before += edge(order[j], order[j + 1]);
                    after += edge(order[i + 1], order[j + 1]);
                }

                if after < before - 1e-9 {
                    order[i + 1..=j].reverse();
                    improved = true;
                }
            }
        }

        if !improved {
            break;
        }
    }

    passes
}
