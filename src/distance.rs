//! Distance/duration matrices and the estimator that produces them.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::RoutingError;
use crate::haversine::HaversineMatrix;
use crate::model::{Coordinate, CostMode};
use crate::traits::{RoutingService, TravelCost};

/// Square travel cost matrix, stored as flat row-major vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelCostMatrix {
    size: usize,
    distances_km: Vec<f64>,
    durations_min: Vec<f64>,
    distance_scale: f64,
    duration_scale: f64,
}

impl TravelCostMatrix {
    pub fn from_flat(size: usize, distances_km: Vec<f64>, durations_min: Vec<f64>) -> Self {
        debug_assert_eq!(distances_km.len(), size * size);
        debug_assert_eq!(durations_min.len(), size * size);

        let distance_scale = mean_off_diagonal(size, &distances_km);
        let duration_scale = mean_off_diagonal(size, &durations_min);

        Self {
            size,
            distances_km,
            durations_min,
            distance_scale,
            duration_scale,
        }
    }

    /// Builds a matrix from `[origin][destination]` rows, rejecting ragged
    /// or non-finite input.
    pub fn from_rows(rows: Vec<Vec<TravelCost>>) -> Result<Self, RoutingError> {
        let size = rows.len();
        let mut distances = Vec::with_capacity(size * size);
        let mut durations = Vec::with_capacity(size * size);

        for row in rows {
            if row.len() != size {
                return Err(RoutingError::InvalidResponse(format!(
                    "matrix row has {} entries, expected {}",
                    row.len(),
                    size
                )));
            }
            for cost in row {
                if !cost.distance_km.is_finite() || !cost.duration_min.is_finite() {
                    return Err(RoutingError::Unreachable);
                }
                distances.push(cost.distance_km);
                durations.push(cost.duration_min);
            }
        }

        Ok(Self::from_flat(size, distances, durations))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn distance_km(&self, from: usize, to: usize) -> f64 {
        self.distances_km[from * self.size + to]
    }

    pub fn duration_min(&self, from: usize, to: usize) -> f64 {
        self.durations_min[from * self.size + to]
    }

    /// Cost of one directed edge under `mode`. Balanced mode weighs distance
    /// and duration equally after dividing each by its mean edge value.
    pub fn cost(&self, from: usize, to: usize, mode: CostMode) -> f64 {
        match mode {
            CostMode::Distance => self.distance_km(from, to),
            CostMode::Duration => self.duration_min(from, to),
            CostMode::Balanced => {
                0.5 * self.distance_km(from, to) / self.distance_scale
                    + 0.5 * self.duration_min(from, to) / self.duration_scale
            }
        }
    }

    /// Direction-agnostic edge cost, used where a segment may be reversed.
    pub fn symmetric_cost(&self, a: usize, b: usize, mode: CostMode) -> f64 {
        0.5 * (self.cost(a, b, mode) + self.cost(b, a, mode))
    }

    /// Cost of visiting `order` as an open path.
    pub fn path_cost(&self, order: &[usize], mode: CostMode) -> f64 {
        order
            .windows(2)
            .map(|pair| self.cost(pair[0], pair[1], mode))
            .sum()
    }

    pub fn path_distance_km(&self, order: &[usize]) -> f64 {
        self.path_cost(order, CostMode::Distance)
    }
}

fn mean_off_diagonal(size: usize, values: &[f64]) -> f64 {
    if size < 2 {
        return 1.0;
    }

    let mut sum = 0.0;
    for i in 0..size {
        for j in 0..size {
            if i != j {
                sum += values[i * size + j];
            }
        }
    }

    let mean = sum / (size * (size - 1)) as f64;
    if mean > 0.0 { mean } else { 1.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixSource {
    RoadNetwork,
    GreatCircle,
}

/// Produces travel matrices: road-network values from the routing service
/// when one is configured and answers, great-circle estimates otherwise.
#[derive(Clone)]
pub struct DistanceEstimator {
    haversine: HaversineMatrix,
    routing: Option<Arc<dyn RoutingService>>,
}

impl DistanceEstimator {
    pub fn new(haversine: HaversineMatrix, routing: Option<Arc<dyn RoutingService>>) -> Self {
        Self { haversine, routing }
    }

    pub fn great_circle_only(haversine: HaversineMatrix) -> Self {
        Self::new(haversine, None)
    }

    pub fn great_circle(&self, points: &[Coordinate]) -> TravelCostMatrix {
        self.haversine.matrix_for(points)
    }

    pub fn matrix_for(&self, points: &[Coordinate]) -> (TravelCostMatrix, MatrixSource) {
        if let Some(routing) = &self.routing {
            if points.len() > 1 {
                match routing
                    .distance_matrix(points, points)
                    .and_then(TravelCostMatrix::from_rows)
                {
                    Ok(matrix) if matrix.size() == points.len() => {
                        debug!(points = points.len(), "using road network matrix");
                        return (matrix, MatrixSource::RoadNetwork);
                    }
                    Ok(matrix) => {
                        warn!(
                            expected = points.len(),
                            received = matrix.size(),
                            "road network matrix has the wrong size, using great-circle estimates"
                        );
                    }
                    Err(err) => {
                        warn!(error = %err, "road network matrix unavailable, using great-circle estimates");
                    }
                }
            }
        }

        (self.great_circle(points), MatrixSource::GreatCircle)
    }
}
