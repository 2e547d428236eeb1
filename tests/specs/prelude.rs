//! Shared scaffolding for the integration specs: a real `Store` (either
//! in-memory or on-disk), a `Dispatcher` wired to a `StepManager`, and a
//! `WorkerPool` that actually pulls leaf jobs off the queue rather than
//! finishing them synchronously.

#![allow(dead_code)]

pub use async_trait::async_trait;
pub use jobtree_core::{
    CoreError, ErrorTolerance, FailureAction, FakeClock, JobDefinition, JobId, JobStatus, NodeKind,
    OnError, StepDefinition, StepMonitor, Worker, WorkerExecuteContext, WorkerInitContext,
    WorkerInitResult,
};
pub use jobtree_engine::{
    worker_pool::{LeafContext, LeafWorker, WorkerPool, WorkerPoolConfig},
    CacheService, Dispatcher, EventBus, JobManager, KvStore, StepManager,
};
pub use jobtree_storage::{fake::FakeDocumentStore, Store};
pub use serde_json::{json, Value};
pub use std::collections::HashMap as Map;
pub use std::sync::Arc;
pub use std::time::Duration;
pub use tokio_util::sync::CancellationToken;

pub type SpecStore = Store<FakeClock>;
pub type SpecJobManager = JobManager<SpecStore, FakeClock>;
pub type SpecStepManager = StepManager<FakeDocumentStore, FakeClock>;
pub type SpecDispatcher = Dispatcher<SpecStore, FakeClock, FakeDocumentStore>;
pub type SpecWorkerPool = WorkerPool<SpecStore, FakeClock>;

pub struct NullKv;
impl KvStore for NullKv {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }
}

pub fn in_memory_job_manager() -> SpecJobManager {
    let clock = FakeClock::new();
    let store = Arc::new(Store::in_memory(clock.clone()));
    JobManager::new(store, EventBus::new(), clock)
}

pub fn job_manager_over(store: Arc<SpecStore>) -> SpecJobManager {
    JobManager::new(store, EventBus::new(), FakeClock::new())
}

pub fn dispatcher_for(job_manager: SpecJobManager, step_manager: SpecStepManager) -> SpecDispatcher {
    Dispatcher::new(job_manager, Arc::new(step_manager), Arc::new(NullKv), FakeClock::new())
}

/// Worker pool with a short poll interval so specs don't wait out the
/// real `1s`/`5` concurrency production defaults.
pub fn fast_worker_pool(job_manager: SpecJobManager, handlers: Vec<Arc<dyn LeafWorker>>) -> Arc<SpecWorkerPool> {
    let config = WorkerPoolConfig { poll_interval: Duration::from_millis(10), concurrency: 2, ..WorkerPoolConfig::default() };
    WorkerPool::with_handlers(job_manager, config, FakeClock::new(), handlers)
}

pub fn minimal_step(name: &str, step_type: &str) -> StepDefinition {
    StepDefinition {
        name: name.to_string(),
        step_type: step_type.to_string(),
        description: None,
        depends: None,
        always_run: false,
        on_error: OnError::Fail,
        config: Map::new(),
    }
}

pub fn step_with_error_policy(name: &str, step_type: &str, on_error: OnError) -> StepDefinition {
    StepDefinition { on_error, ..minimal_step(name, step_type) }
}

pub fn dependent_step(name: &str, step_type: &str, depends_on: &str) -> StepDefinition {
    StepDefinition { depends: Some(depends_on.to_string()), ..minimal_step(name, step_type) }
}

pub fn minimal_jobdef(steps: Vec<StepDefinition>) -> JobDefinition {
    JobDefinition {
        id: "spec-jobdef".into(),
        name: "spec-definition".into(),
        kind: "crawl".into(),
        source_type: None,
        base_url: None,
        schedule: None,
        timeout_secs: 30 * 60,
        enabled: true,
        auth_id: None,
        tags: vec![],
        config: Map::new(),
        error_tolerance: None,
        steps,
    }
}

pub fn cache_service() -> CacheService<FakeDocumentStore, FakeClock> {
    CacheService::new(Arc::new(FakeDocumentStore::new()), FakeClock::new())
}

/// A step-level `Worker` (drives the dispatcher's init/execute phases)
/// that spawns `n` leaf jobs and enqueues a real queue message for each
/// one, leaving them `pending` for a `WorkerPool` to pick up — unlike
/// the per-crate dispatcher specs, which finish leaves synchronously.
pub struct EnqueueingWorker {
    pub job_manager: SpecJobManager,
    pub leaf_type: String,
    pub n: usize,
}

#[async_trait]
impl Worker for EnqueueingWorker {
    fn get_type(&self) -> &str {
        "crawl"
    }
    fn returns_child_jobs(&self) -> bool {
        true
    }
    fn validate_config(&self, _config: &Map<String, Value>) -> Result<(), CoreError> {
        Ok(())
    }
    async fn init(&self, _ctx: &WorkerInitContext<'_>) -> Result<WorkerInitResult, CoreError> {
        Ok(WorkerInitResult { total_count: self.n as u64, ..Default::default() })
    }
    async fn create_jobs(&self, ctx: &WorkerExecuteContext<'_>) -> Result<JobId, CoreError> {
        for i in 0..self.n {
            let leaf_id = JobId::new();
            self.job_manager
                .create_child_job(leaf_id, ctx.parent_job_id, ctx.parent_job_id, NodeKind::Worker(self.leaf_type.clone()), format!("leaf-{i}"))
                .map_err(|err| CoreError::ExecuteFailed(err.to_string()))?;
            let message = jobtree_core::JobMessage::new(leaf_id, self.leaf_type.clone());
            let payload = message.encode().map_err(|err| CoreError::ExecuteFailed(err.to_string()))?;
            self.job_manager
                .store()
                .enqueue(leaf_id, self.leaf_type.clone(), payload)
                .map_err(|err| CoreError::ExecuteFailed(err.to_string()))?;
        }
        Ok(ctx.parent_job_id)
    }
}

/// Leaf handler run by the `WorkerPool`: completes immediately and
/// records one document against the manager.
pub struct RecordingLeafWorker {
    pub job_manager: SpecJobManager,
    pub leaf_type: String,
}

#[async_trait]
impl LeafWorker for RecordingLeafWorker {
    fn get_type(&self) -> &str {
        &self.leaf_type
    }
    async fn execute(&self, ctx: &LeafContext<'_>, _cancel: &CancellationToken) -> Result<(), CoreError> {
        let hierarchy = self
            .job_manager
            .resolve_job_hierarchy(ctx.job.id)
            .map_err(|err| CoreError::ExecuteFailed(err.to_string()))?;
        self.job_manager
            .increment_document_count(hierarchy.manager_id)
            .map_err(|err| CoreError::ExecuteFailed(err.to_string()))?;
        Ok(())
    }
}

/// A step-level `Worker` with no children, used for the happy-path spec.
pub struct NoChildWorker;

#[async_trait]
impl Worker for NoChildWorker {
    fn get_type(&self) -> &str {
        "noop"
    }
    fn returns_child_jobs(&self) -> bool {
        false
    }
    fn validate_config(&self, _config: &Map<String, Value>) -> Result<(), CoreError> {
        Ok(())
    }
    async fn init(&self, _ctx: &WorkerInitContext<'_>) -> Result<WorkerInitResult, CoreError> {
        Ok(WorkerInitResult::default())
    }
    async fn create_jobs(&self, ctx: &WorkerExecuteContext<'_>) -> Result<JobId, CoreError> {
        Ok(ctx.parent_job_id)
    }
}

/// A step-level `Worker` whose init phase always fails, for the
/// dependency-cascade / error-tolerance specs.
pub struct AlwaysFailsWorker;

#[async_trait]
impl Worker for AlwaysFailsWorker {
    fn get_type(&self) -> &str {
        "failing"
    }
    fn returns_child_jobs(&self) -> bool {
        false
    }
    fn validate_config(&self, _config: &Map<String, Value>) -> Result<(), CoreError> {
        Ok(())
    }
    async fn init(&self, _ctx: &WorkerInitContext<'_>) -> Result<WorkerInitResult, CoreError> {
        Err(CoreError::InitFailed("boom".into()))
    }
    async fn create_jobs(&self, _ctx: &WorkerExecuteContext<'_>) -> Result<JobId, CoreError> {
        unreachable!("init always fails first")
    }
}

/// A `StepMonitor` that never finalizes the step itself; used to force
/// the dispatcher to hand a spawning step off asynchronously instead of
/// waiting for it inline, so a later step can run (and fail) while the
/// earlier step's children are still pending.
pub struct NoOpStepMonitor;

#[async_trait]
impl StepMonitor for NoOpStepMonitor {
    async fn start_monitoring(&self, _step_id: JobId) -> Result<(), CoreError> {
        Ok(())
    }
}

pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition did not become true in time");
}
