//! HTTP surface: build a plan synchronously or queue it, then poll.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use jiff::civil::Date;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::clustering::{ClusterConstraints, ClusterStrategy};
use crate::error::PlanError;
use crate::jobs::{DeferredPlanner, JobHandle, JobStatus};
use crate::model::{CostMode, DistributionPlan};
use crate::planner::{DistributionPlanner, PlanRequest};
use crate::traits::ClientDirectory;

pub struct AppState {
    pub directory: Arc<dyn ClientDirectory>,
    pub planner: Arc<DistributionPlanner>,
    pub deferred: DeferredPlanner,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/build-plan", post(build_plan_handler))
        .route("/plan-status/{task_handle}", get(plan_status_handler))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unprocessable(String),
    NotFound(String),
    InternalServerError(String),
}

impl From<PlanError> for ApiError {
    fn from(error: PlanError) -> Self {
        match error {
            PlanError::Input(_) => ApiError::BadRequest(error.to_string()),
            PlanError::ClusteringInfeasible(_) => ApiError::Unprocessable(error.to_string()),
            PlanError::Internal(_) => ApiError::InternalServerError(error.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            ApiError::Unprocessable(message) => {
                (StatusCode::UNPROCESSABLE_ENTITY, message).into_response()
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
            ApiError::InternalServerError(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    Density,
    Partition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sync,
    Async,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPlanBody {
    pub client_ids: Vec<String>,
    pub date: Date,
    pub max_stops_per_route: usize,
    pub max_distance_km: f64,
    pub strategy: StrategyName,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub cost_mode: CostMode,
}

impl BuildPlanBody {
    fn into_request(self, directory: &dyn ClientDirectory) -> PlanRequest {
        let strategy = match self.strategy {
            StrategyName::Density => ClusterStrategy::density(),
            StrategyName::Partition => ClusterStrategy::partition(),
        };
        PlanRequest::from_directory(
            directory,
            &self.client_ids,
            self.date,
            ClusterConstraints::new(self.max_stops_per_route, self.max_distance_km),
            strategy,
            self.cost_mode,
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedResponse {
    pub task_handle: JobHandle,
}

pub enum BuildPlanResponse {
    Completed(DistributionPlan),
    Queued(QueuedResponse),
}

impl IntoResponse for BuildPlanResponse {
    fn into_response(self) -> Response {
        match self {
            BuildPlanResponse::Completed(plan) => (StatusCode::OK, Json(plan)).into_response(),
            BuildPlanResponse::Queued(queued) => (StatusCode::ACCEPTED, Json(queued)).into_response(),
        }
    }
}

pub async fn build_plan_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BuildPlanBody>,
) -> Result<BuildPlanResponse, ApiError> {
    let mode = body.mode;
    let request = body.into_request(state.directory.as_ref());

    match mode {
        ExecutionMode::Async => {
            let task_handle = state.deferred.submit(request);
            Ok(BuildPlanResponse::Queued(QueuedResponse { task_handle }))
        }
        ExecutionMode::Sync => {
            let planner = Arc::clone(&state.planner);
            let plan = tokio::task::spawn_blocking(move || planner.build_plan(&request))
                .await
                .map_err(|err| {
                    error!(error = %err, "plan build task aborted");
                    ApiError::InternalServerError(err.to_string())
                })??;
            info!(plan_id = %plan.plan_id, "plan built synchronously");
            Ok(BuildPlanResponse::Completed(plan))
        }
    }
}

pub async fn plan_status_handler(
    Path(task_handle): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<JobStatus>, ApiError> {
    JobHandle::parse(&task_handle)
        .and_then(|handle| state.deferred.status(&handle))
        .map(Json)
        .ok_or(ApiError::NotFound(task_handle))
}
