//! Density-based grouping: connected components of eps-reachable points.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::ClusterConstraints;
use crate::error::PlanError;
use crate::haversine::great_circle_km;
use crate::model::LocationPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DensityParams {
    /// Reachability radius. Defaults to the cluster span bound. The radius is
    /// fixed across the service region; dense and sparse areas share it.
    #[serde(default)]
    pub eps_km: Option<f64>,
    /// Components smaller than this are emitted as singletons.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

fn default_min_samples() -> usize {
    2
}

impl Default for DensityParams {
    fn default() -> Self {
        Self {
            eps_km: None,
            min_samples: default_min_samples(),
        }
    }
}

impl DensityParams {
    pub fn eps_for(&self, constraints: &ClusterConstraints) -> Result<f64, PlanError> {
        let eps = self.eps_km.unwrap_or(constraints.max_span_km);
        if eps.is_finite() && eps > 0.0 {
            Ok(eps)
        } else {
            Err(PlanError::ClusteringInfeasible(format!(
                "density radius must be a positive distance, got {eps}"
            )))
        }
    }
}

pub(crate) fn group(
    points: &[LocationPoint],
    constraints: &ClusterConstraints,
    params: &DensityParams,
) -> Result<Vec<Vec<usize>>, PlanError> {
    let eps = params.eps_for(constraints)?;
    let min_samples = params.min_samples.max(1);

    let mut visited = vec![false; points.len()];
    let mut groups = Vec::new();

    for seed in 0..points.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;

        let mut component = vec![seed];
        let mut frontier = VecDeque::from([seed]);
        while let Some(current) = frontier.pop_front() {
            for candidate in 0..points.len() {
                if visited[candidate] {
                    continue;
                }
                if great_circle_km(points[current].coordinate, points[candidate].coordinate) <= eps {
                    visited[candidate] = true;
                    component.push(candidate);
                    frontier.push_back(candidate);
                }
            }
        }

        if component.len() >= min_samples {
            groups.push(component);
        } else {
            // noise still has to be delivered
            groups.extend(component.into_iter().map(|index| vec![index]));
        }
    }

    Ok(groups)
}
