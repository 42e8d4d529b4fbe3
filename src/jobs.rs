//! Deferred plan builds: a local worker pool behind the [`TaskQueue`]
//! contract, and the adapter that submits plan requests to any queue.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use fxhash::FxHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PlanError;
use crate::model::DistributionPlan;
use crate::planner::{DistributionPlanner, PlanRequest};
use crate::retry::RetryPolicy;
use crate::traits::TaskQueue;

/// One unit of deferred work. Retries call it again, so it must be safe to
/// run more than once.
pub type PlanTask = Box<dyn Fn() -> Result<DistributionPlan, PlanError> + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(Uuid);

impl JobHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running { attempt: u32 },
    Succeeded { result: DistributionPlan },
    Failed { error: PlanError },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Succeeded { .. } | JobStatus::Failed { .. })
    }
}

/// Finished statuses a [`LocalTaskQueue`] keeps by default.
pub const DEFAULT_RETAINED_JOBS: usize = 1024;

#[derive(Debug, Clone)]
pub struct DeferredConfig {
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Finished jobs kept for polling. Older ones are forgotten and poll as
    /// unknown.
    pub retain_finished: usize,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            retain_finished: DEFAULT_RETAINED_JOBS,
        }
    }
}

impl DeferredConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, self.retry_delay)
    }
}

/// Job statuses plus the order in which jobs finished, oldest first.
#[derive(Debug)]
struct JobTable {
    statuses: FxHashMap<JobHandle, JobStatus>,
    finished: VecDeque<JobHandle>,
    retain_finished: usize,
}

impl JobTable {
    fn new(retain_finished: usize) -> Self {
        Self {
            statuses: FxHashMap::default(),
            finished: VecDeque::new(),
            retain_finished,
        }
    }

    fn set(&mut self, handle: JobHandle, status: JobStatus) {
        let finished = status.is_finished();
        self.statuses.insert(handle, status);
        if !finished {
            return;
        }

        self.finished.push_back(handle);
        while self.finished.len() > self.retain_finished {
            if let Some(oldest) = self.finished.pop_front() {
                self.statuses.remove(&oldest);
            }
        }
    }
}

type SharedJobTable = Arc<RwLock<JobTable>>;

/// In-process queue running tasks on a dedicated rayon pool. Pending and
/// running jobs are always kept; only the most recent `retain_finished`
/// finished jobs stay pollable.
pub struct LocalTaskQueue {
    pool: rayon::ThreadPool,
    jobs: SharedJobTable,
}

impl LocalTaskQueue {
    pub fn new(workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        Self::with_retention(workers, DEFAULT_RETAINED_JOBS)
    }

    pub fn with_retention(workers: usize, retain_finished: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|index| format!("plan-worker-{index}"))
            .build()?;

        Ok(Self {
            pool,
            jobs: Arc::new(RwLock::new(JobTable::new(retain_finished))),
        })
    }

    pub fn len(&self) -> usize {
        self.jobs.read().statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().statuses.is_empty()
    }
}

impl TaskQueue for LocalTaskQueue {
    fn enqueue(&self, task: PlanTask, retry: RetryPolicy) -> JobHandle {
        let handle = JobHandle::new();
        self.jobs.write().set(handle, JobStatus::Pending);

        let jobs = Arc::clone(&self.jobs);
        self.pool.spawn(move || run_job(handle, task, retry, jobs));

        handle
    }

    fn poll(&self, handle: &JobHandle) -> Option<JobStatus> {
        self.jobs.read().statuses.get(handle).cloned()
    }
}

fn run_job(handle: JobHandle, task: PlanTask, retry: RetryPolicy, jobs: SharedJobTable) {
    let outcome = retry.run(
        |attempt| {
            jobs.write().set(handle, JobStatus::Running { attempt });
            panic::catch_unwind(AssertUnwindSafe(|| task()))
                .unwrap_or_else(|payload| Err(PlanError::Internal(panic_message(payload.as_ref()))))
        },
        PlanError::is_retryable,
    );

    let status = match outcome {
        Ok(plan) => {
            info!(job = %handle, plan_id = %plan.plan_id, "deferred plan succeeded");
            JobStatus::Succeeded { result: plan }
        }
        Err(error) => {
            warn!(job = %handle, %error, "deferred plan failed");
            JobStatus::Failed { error }
        }
    };
    jobs.write().set(handle, status);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("plan worker panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("plan worker panicked: {message}")
    } else {
        "plan worker panicked".to_string()
    }
}

/// Submits plan builds to a task queue. Works with any [`TaskQueue`].
pub struct DeferredPlanner {
    planner: Arc<DistributionPlanner>,
    queue: Arc<dyn TaskQueue>,
    retry: RetryPolicy,
}

impl DeferredPlanner {
    pub fn new(planner: Arc<DistributionPlanner>, queue: Arc<dyn TaskQueue>, retry: RetryPolicy) -> Self {
        Self { planner, queue, retry }
    }

    pub fn submit(&self, request: PlanRequest) -> JobHandle {
        let planner = Arc::clone(&self.planner);
        let handle = self
            .queue
            .enqueue(Box::new(move || planner.build_plan(&request)), self.retry.clone());
        info!(job = %handle, "plan build queued");
        handle
    }

    pub fn status(&self, handle: &JobHandle) -> Option<JobStatus> {
        self.queue.poll(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::Instant;

    fn wait_for(queue: &LocalTaskQueue, handle: &JobHandle) -> JobStatus {
        let started = Instant::now();
        loop {
            let status = queue.poll(handle).unwrap();
            if status.is_finished() || started.elapsed() > Duration::from_secs(5) {
                return status;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_internal_errors_are_retried() {
        let queue = LocalTaskQueue::new(1).unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let handle = queue.enqueue(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PlanError::Internal("boom".into()))
            }),
            RetryPolicy::fixed(3, Duration::ZERO),
        );

        assert!(matches!(wait_for(&queue, &handle), JobStatus::Failed { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_input_errors_fail_once() {
        let queue = LocalTaskQueue::new(1).unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let handle = queue.enqueue(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PlanError::Input("no clients".into()))
            }),
            RetryPolicy::fixed(3, Duration::ZERO),
        );

        match wait_for(&queue, &handle) {
            JobStatus::Failed { error } => assert_eq!(error, PlanError::Input("no clients".into())),
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_becomes_internal_error() {
        let queue = LocalTaskQueue::new(1).unwrap();
        let handle = queue.enqueue(Box::new(|| panic!("worker exploded")), RetryPolicy::none());

        match wait_for(&queue, &handle) {
            JobStatus::Failed {
                error: PlanError::Internal(message),
            } => assert!(message.contains("worker exploded")),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn test_unknown_handle() {
        let queue = LocalTaskQueue::new(1).unwrap();
        assert!(queue.poll(&JobHandle::new()).is_none());
        assert!(JobHandle::parse("not-a-uuid").is_none());
    }

    #[test]
    fn test_only_recent_finished_jobs_are_kept() {
        let queue = LocalTaskQueue::with_retention(1, 2).unwrap();
        let handles: Vec<JobHandle> = (0..4)
            .map(|_| queue.enqueue(Box::new(|| Err(PlanError::Input("no clients".into()))), RetryPolicy::none()))
            .collect();

        // one worker runs jobs in submission order
        assert!(wait_for(&queue, &handles[3]).is_finished());

        assert!(queue.poll(&handles[0]).is_none());
        assert!(queue.poll(&handles[1]).is_none());
        assert!(queue.poll(&handles[2]).is_some());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(JobStatus::Running { attempt: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "running", "attempt": 2}));

        let json = serde_json::to_value(JobStatus::Failed {
            error: PlanError::Input("no clients".into()),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["type"], "input");
    }
}
