//! Plan orchestration: geocode the gaps, cluster, sequence every cluster in
//! parallel and assemble a [`DistributionPlan`].

use std::hash::Hasher;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fxhash::{FxHashMap, FxHashSet, FxHasher64};
use jiff::civil::Date;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clustering::{self, ClusterConstraints, ClusterStrategy};
use crate::error::{FailureKind, GeocodeFailure, PlanError};
use crate::geocoding::GeocodingGateway;
use crate::model::{
    ClientPoint, Cluster, CostMode, DistributionPlan, LocationPoint, PlanWarning, SequencedRoute, UnassignedReason,
};
use crate::sequencer::RouteSequencer;
use crate::traits::ClientDirectory;

#[derive(Debug, Clone, Default)]
pub struct PlannerOptions {
    /// Overall budget for one plan build, measured from its start. Once it
    /// runs out no geocoding or routing request is sent, and clients whose
    /// address or cluster is unfinished are reported as unassigned.
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub date: Date,
    pub clients: Vec<ClientPoint>,
    /// Requested ids with no client record behind them.
    #[serde(default)]
    pub unknown_client_ids: Vec<String>,
    pub constraints: ClusterConstraints,
    pub strategy: ClusterStrategy,
    #[serde(default)]
    pub cost_mode: CostMode,
}

impl PlanRequest {
    pub fn new(
        date: Date,
        clients: Vec<ClientPoint>,
        constraints: ClusterConstraints,
        strategy: ClusterStrategy,
        cost_mode: CostMode,
    ) -> Self {
        Self {
            date,
            clients,
            unknown_client_ids: Vec::new(),
            constraints,
            strategy,
            cost_mode,
        }
    }

    /// Resolves `ids` through the directory. Ids without a record are kept
    /// so the plan can report them.
    pub fn from_directory(
        directory: &dyn ClientDirectory,
        ids: &[String],
        date: Date,
        constraints: ClusterConstraints,
        strategy: ClusterStrategy,
        cost_mode: CostMode,
    ) -> Self {
        let mut request = Self::new(date, Vec::new(), constraints, strategy, cost_mode);
        for (id, record) in ids.iter().zip(directory.lookup(ids)) {
            match record {
                Some(client) => request.clients.push(client),
                None => request.unknown_client_ids.push(id.clone()),
            }
        }
        request
    }

    fn validate(&self) -> Result<(), PlanError> {
        if self.clients.is_empty() && self.unknown_client_ids.is_empty() {
            return Err(PlanError::Input("no clients to plan".to_string()));
        }

        let mut seen = FxHashSet::default();
        let ids = self
            .clients
            .iter()
            .map(|client| &client.id)
            .chain(&self.unknown_client_ids);
        for id in ids {
            if id.trim().is_empty() {
                return Err(PlanError::Input("client id is empty".to_string()));
            }
            if !seen.insert(id.as_str()) {
                return Err(PlanError::Input(format!("client id {id} appears more than once")));
            }
        }

        self.constraints.validate()
    }

    /// Digest of everything that determines the plan.
    fn plan_id(&self) -> String {
        let mut hasher = FxHasher64::default();
        hasher.write(self.date.to_string().as_bytes());
        hasher.write_usize(self.constraints.max_stops);
        hasher.write_u64(self.constraints.max_span_km.to_bits());
        hasher.write(format!("{:?}|{:?}", self.strategy, self.cost_mode).as_bytes());
        for client in &self.clients {
            hasher.write(client.id.as_bytes());
            hasher.write(client.address.as_deref().unwrap_or_default().as_bytes());
            if let Some(coordinate) = client.coordinate {
                hasher.write_u64(coordinate.latitude().to_bits());
                hasher.write_u64(coordinate.longitude().to_bits());
            }
        }
        for id in &self.unknown_client_ids {
            hasher.write(id.as_bytes());
        }
        format!("{:016x}", hasher.finish())
    }
}

pub struct DistributionPlanner {
    gateway: Arc<GeocodingGateway>,
    sequencer: Arc<RouteSequencer>,
    options: PlannerOptions,
}

impl DistributionPlanner {
    pub fn new(gateway: Arc<GeocodingGateway>, sequencer: RouteSequencer, options: PlannerOptions) -> Self {
        Self {
            gateway,
            sequencer: Arc::new(sequencer),
            options,
        }
    }

    pub fn gateway(&self) -> &Arc<GeocodingGateway> {
        &self.gateway
    }

    /// Builds a plan. Only invalid input or constraints fail the call;
    /// geocoding failures, routing fallbacks and an expired deadline are
    /// reported inside the plan.
    pub fn build_plan(&self, request: &PlanRequest) -> Result<DistributionPlan, PlanError> {
        let started = Instant::now();
        request.validate()?;
        let deadline = self.options.deadline.map(|budget| started + budget);

        let mut unassigned: Vec<(String, UnassignedReason)> = request
            .unknown_client_ids
            .iter()
            .map(|id| (id.clone(), UnassignedReason::UnknownClient))
            .collect();

        let (points, failures) = self.locate(&request.clients, deadline);
        for (id, failure) in failures {
            let reason = match failure.kind {
                FailureKind::DeadlineExceeded => UnassignedReason::DeadlineExceeded,
                kind => UnassignedReason::GeocodingFailed {
                    kind,
                    reason: failure.reason,
                },
            };
            unassigned.push((id, reason));
        }
        info!(
            clients = request.clients.len(),
            located = points.len(),
            unassigned = unassigned.len(),
            "clients located"
        );

        let mut routes = if points.is_empty() {
            Vec::new()
        } else {
            let clusters = clustering::cluster(&points, &request.constraints, &request.strategy)?;
            let (routes, cancelled) = self.sequence_clusters(&clusters, request.cost_mode, deadline);
            unassigned.extend(cancelled.into_iter().map(|id| (id, UnassignedReason::DeadlineExceeded)));
            routes
        };
        routes.sort_by_key(|route| route.cluster_id);

        // Report unassigned clients in request order.
        let position: FxHashMap<&str, usize> = request
            .clients
            .iter()
            .map(|client| client.id.as_str())
            .chain(request.unknown_client_ids.iter().map(String::as_str))
            .enumerate()
            .map(|(index, id)| (id, index))
            .collect();
        unassigned.sort_by_key(|(id, _)| position.get(id.as_str()).copied().unwrap_or(usize::MAX));

        let unassigned_ids = unassigned.iter().map(|(id, _)| id.clone()).collect();
        let mut warnings: Vec<PlanWarning> = unassigned
            .into_iter()
            .map(|(id, reason)| PlanWarning::Unassigned { id, reason })
            .collect();
        warnings.extend(
            routes
                .iter()
                .filter(|route| !route.used_external_routing && !route.legs.is_empty())
                .map(|route| PlanWarning::LocalHeuristic {
                    cluster_id: route.cluster_id,
                }),
        );

        let plan = DistributionPlan {
            plan_id: request.plan_id(),
            date: request.date,
            routes,
            unassigned_ids,
            warnings,
        };

        info!(
            plan_id = %plan.plan_id,
            routes = plan.routes.len(),
            unassigned = plan.unassigned_ids.len(),
            partial = plan.is_partial(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "plan assembled"
        );

        Ok(plan)
    }

    /// Sequences every cluster as its own task on the rayon pool. With a
    /// deadline, results are collected until it passes; members of clusters
    /// still unfinished come back as cancelled ids and the late routes are
    /// dropped.
    fn sequence_clusters(
        &self,
        clusters: &[Cluster],
        mode: CostMode,
        deadline: Option<Instant>,
    ) -> (Vec<SequencedRoute>, Vec<String>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        for (index, cluster) in clusters.iter().enumerate() {
            let sender = sender.clone();
            let sequencer = Arc::clone(&self.sequencer);
            let cluster = cluster.clone();
            rayon::spawn_fifo(move || {
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    return;
                }
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    sequencer.sequence_until(&cluster, mode, deadline)
                }));
                // fails only when the plan was assembled without this cluster
                let _ = sender.send((index, outcome));
            });
        }
        drop(sender);

        let mut finished: Vec<Option<SequencedRoute>> = vec![None; clusters.len()];
        let mut pending = clusters.len();
        while pending > 0 {
            let received = match deadline {
                Some(deadline) => receiver.recv_deadline(deadline).ok(),
                None => receiver.recv().ok(),
            };
            let Some((index, outcome)) = received else {
                break;
            };
            pending -= 1;
            match outcome {
                Ok(route) => finished[index] = Some(route),
                Err(payload) => panic::resume_unwind(payload),
            }
        }

        let mut routes = Vec::with_capacity(clusters.len());
        let mut cancelled = Vec::new();
        for (cluster, route) in clusters.iter().zip(finished) {
            match route {
                Some(route) => routes.push(route),
                None => {
                    warn!(cluster_id = cluster.cluster_id, "deadline passed before the cluster was sequenced");
                    cancelled.extend(cluster.members.iter().map(|member| member.id.clone()));
                }
            }
        }
        (routes, cancelled)
    }

    /// Splits clients into located points and geocoding failures. Clients
    /// that already carry a coordinate skip the gateway.
    fn locate(
        &self,
        clients: &[ClientPoint],
        deadline: Option<Instant>,
    ) -> (Vec<LocationPoint>, Vec<(String, GeocodeFailure)>) {
        let pending: Vec<&ClientPoint> = clients.iter().filter(|client| client.coordinate.is_none()).collect();
        let addresses: Vec<String> = pending
            .iter()
            .map(|client| client.address.clone().unwrap_or_default())
            .collect();

        let mut resolved: FxHashMap<&str, Result<LocationPoint, GeocodeFailure>> = FxHashMap::default();
        if !addresses.is_empty() {
            debug!(pending = addresses.len(), "geocoding clients without coordinates");
            for (client, resolution) in pending.iter().zip(self.gateway.resolve_until(&addresses, deadline)) {
                let outcome = resolution.result.map(|found| LocationPoint {
                    id: client.id.clone(),
                    coordinate: found.coordinate,
                    weight: client.weight,
                });
                resolved.insert(client.id.as_str(), outcome);
            }
        }

        let mut points = Vec::with_capacity(clients.len());
        let mut failures = Vec::new();
        for client in clients {
            if let Some(coordinate) = client.coordinate {
                points.push(LocationPoint {
                    id: client.id.clone(),
                    coordinate,
                    weight: client.weight,
                });
                continue;
            }
            match resolved.remove(client.id.as_str()) {
                Some(Ok(point)) => points.push(point),
                Some(Err(failure)) => failures.push((client.id.clone(), failure)),
                None => failures.push((
                    client.id.clone(),
                    GeocodeFailure::invalid_input("no geocoding result"),
                )),
            }
        }

        (points, failures)
    }
}
