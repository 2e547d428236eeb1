use super::*;
use crate::cache_service::CacheService;
use crate::event_bus::EventBus;
use async_trait::async_trait;
use jobtree_core::{CoreError, ErrorTolerance, FakeClock, JobStatus, Worker, WorkerExecuteContext, WorkerInitContext, WorkerInitResult};
use jobtree_storage::fake::FakeDocumentStore;
use jobtree_storage::Store;
use serde_json::json;
use std::collections::HashMap as Map;

type TestJobManager = JobManager<Store<FakeClock>, FakeClock>;
type TestStepManager = StepManager<FakeDocumentStore, FakeClock>;
type TestDispatcher = Dispatcher<Store<FakeClock>, FakeClock, FakeDocumentStore>;

struct NullKv;
impl KvStore for NullKv {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }
}

fn make_job_manager() -> TestJobManager {
    let clock = FakeClock::new();
    let store = Arc::new(Store::in_memory(clock.clone()));
    JobManager::new(store, EventBus::new(), clock)
}

fn make_dispatcher(job_manager: TestJobManager, step_manager: TestStepManager) -> TestDispatcher {
    let clock = FakeClock::new();
    Dispatcher::new(job_manager, Arc::new(step_manager), Arc::new(NullKv), clock)
}

fn minimal_step(name: &str, step_type: &str) -> StepDefinition {
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

fn minimal_jobdef(steps: Vec<StepDefinition>) -> JobDefinition {
    JobDefinition {
        id: "jd1".into(),
        name: "my-definition".into(),
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

/// A worker that doesn't produce any child jobs.
struct NoChildWorker;

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

/// A worker that spawns `n` leaf jobs synchronously and marks them all
/// completed before returning, so the dispatcher observes zero pending /
/// running children immediately on return.
struct SpawnsAndFinishesWorker {
    job_manager: TestJobManager,
    n: usize,
}

#[async_trait]
impl Worker for SpawnsAndFinishesWorker {
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
                .create_child_job(
                    leaf_id,
                    ctx.parent_job_id,
                    ctx.parent_job_id,
                    jobtree_core::NodeKind::Worker("crawl".into()),
                    format!("leaf-{i}"),
                )
                .unwrap();
            self.job_manager.update_job_status(leaf_id, JobStatus::Completed, None).unwrap();
        }
        Ok(ctx.parent_job_id)
    }
}

/// A worker that spawns children but leaves them pending — the dispatcher
/// must either wait inline or hand off to a monitor.
struct SpawnsPendingWorker {
    job_manager: TestJobManager,
}

#[async_trait]
impl Worker for SpawnsPendingWorker {
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
        Ok(WorkerInitResult::default())
    }
    async fn create_jobs(&self, ctx: &WorkerExecuteContext<'_>) -> Result<JobId, CoreError> {
        let leaf_id = JobId::new();
        self.job_manager
            .create_child_job(
                leaf_id,
                ctx.parent_job_id,
                ctx.parent_job_id,
                jobtree_core::NodeKind::Worker("crawl".into()),
                "leaf-0",
            )
            .unwrap();
        Ok(ctx.parent_job_id)
    }
}

struct AlwaysFailsWorker;

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

struct RecordingStepMonitor {
    calls: parking_lot::Mutex<Vec<JobId>>,
}

impl RecordingStepMonitor {
    fn new() -> Self {
        Self { calls: parking_lot::Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl StepMonitor for RecordingStepMonitor {
    async fn start_monitoring(&self, step_id: JobId) -> Result<(), CoreError> {
        self.calls.lock().push(step_id);
        Ok(())
    }
}

struct RecordingJobMonitor {
    calls: parking_lot::Mutex<Vec<JobId>>,
}

impl RecordingJobMonitor {
    fn new() -> Self {
        Self { calls: parking_lot::Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl JobMonitor for RecordingJobMonitor {
    async fn start_monitoring(&self, manager_id: JobId) -> Result<(), CoreError> {
        self.calls.lock().push(manager_id);
        Ok(())
    }
}

fn cache_service(job_manager: &TestJobManager) -> CacheService<FakeDocumentStore, FakeClock> {
    let _ = job_manager;
    CacheService::new(Arc::new(FakeDocumentStore::new()), FakeClock::new())
}

#[tokio::test]
async fn happy_path_no_children_completes_manager() {
    let job_manager = make_job_manager();
    let mut step_manager: TestStepManager = StepManager::new().with_cache_service(cache_service(&job_manager));
    step_manager.register_worker(Arc::new(NoChildWorker));
    let dispatcher = make_dispatcher(job_manager.clone(), step_manager);

    let jobdef = minimal_jobdef(vec![minimal_step("s1", "noop")]);
    let cancel = CancellationToken::new();
    let manager_id = dispatcher.execute_job_definition(&jobdef, &cancel, None, None).await.unwrap();

    let manager = job_manager.store().get_job(manager_id).unwrap();
    assert_eq!(manager.status, JobStatus::Completed);
    assert!(manager.finished_at_ms.is_some());

    let steps: Vec<StepStatEntry> =
        serde_json::from_value(manager.metadata.get(meta::STEP_STATS).cloned().unwrap()).unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, JobStatus::Completed);
    assert_eq!(steps[0].child_count, 0);
}

#[tokio::test]
async fn spawn_with_monitor_hands_off_without_waiting() {
    let job_manager = make_job_manager();
    let mut step_manager: TestStepManager = StepManager::new().with_cache_service(cache_service(&job_manager));
    step_manager.register_worker(Arc::new(SpawnsPendingWorker { job_manager: job_manager.clone() }));
    let dispatcher = make_dispatcher(job_manager.clone(), step_manager);

    let jobdef = minimal_jobdef(vec![minimal_step("s1", "crawl")]);
    let cancel = CancellationToken::new();
    let step_monitor: Arc<dyn StepMonitor> = Arc::new(RecordingStepMonitor::new());
    let job_monitor: Arc<dyn JobMonitor> = Arc::new(RecordingJobMonitor::new());

    let manager_id =
        dispatcher.execute_job_definition(&jobdef, &cancel, Some(&job_monitor), Some(&step_monitor)).await.unwrap();

    // Manager status is left for the job monitor to finalize.
    let manager = job_manager.store().get_job(manager_id).unwrap();
    assert_eq!(manager.status, JobStatus::Running);
}

#[tokio::test]
async fn spawn_without_monitor_waits_inline() {
    let job_manager = make_job_manager();
    let mut step_manager: TestStepManager = StepManager::new().with_cache_service(cache_service(&job_manager));
    step_manager.register_worker(Arc::new(SpawnsAndFinishesWorker { job_manager: job_manager.clone(), n: 3 }));
    let dispatcher = make_dispatcher(job_manager.clone(), step_manager);

    let jobdef = minimal_jobdef(vec![minimal_step("s1", "crawl")]);
    let cancel = CancellationToken::new();
    let manager_id = dispatcher.execute_job_definition(&jobdef, &cancel, None, None).await.unwrap();

    let manager = job_manager.store().get_job(manager_id).unwrap();
    assert_eq!(manager.status, JobStatus::Completed);
    let steps: Vec<StepStatEntry> =
        serde_json::from_value(manager.metadata.get(meta::STEP_STATS).cloned().unwrap()).unwrap();
    assert_eq!(steps[0].child_count, 3);
}

#[tokio::test]
async fn dependency_failure_cascades_to_skip() {
    let job_manager = make_job_manager();
    let mut step_manager: TestStepManager = StepManager::new().with_cache_service(cache_service(&job_manager));
    step_manager.register_worker(Arc::new(AlwaysFailsWorker));
    step_manager.register_worker(Arc::new(NoChildWorker));
    let dispatcher = make_dispatcher(job_manager.clone(), step_manager);

    let mut step_a = minimal_step("a", "failing");
    step_a.on_error = OnError::Continue;
    let step_b = minimal_step("b", "noop");
    let mut step_c = minimal_step("c", "noop");
    step_c.depends = Some("a".to_string());
    step_c.on_error = OnError::Fail;

    let jobdef = minimal_jobdef(vec![step_a, step_b, step_c]);
    let cancel = CancellationToken::new();
    let manager_id = dispatcher.execute_job_definition(&jobdef, &cancel, None, None).await.unwrap();

    let manager = job_manager.store().get_job(manager_id).unwrap();
    assert_eq!(manager.status, JobStatus::Failed);

    let steps: Vec<StepStatEntry> =
        serde_json::from_value(manager.metadata.get(meta::STEP_STATS).cloned().unwrap()).unwrap();
    assert_eq!(steps[0].status, JobStatus::Failed); // a
    assert_eq!(steps[1].status, JobStatus::Completed); // b
    assert_eq!(steps[2].status, JobStatus::Skipped); // c

    let c_step = job_manager.store().get_job(steps[2].id).unwrap();
    assert_eq!(c_step.meta_str(meta::SKIP_REASON), Some("dependency 'a' failed"));
}

#[tokio::test]
async fn fatal_on_error_cancels_pending_descendants() {
    let job_manager = make_job_manager();
    let mut step_manager: TestStepManager = StepManager::new().with_cache_service(cache_service(&job_manager));
    step_manager.register_worker(Arc::new(SpawnsPendingWorker { job_manager: job_manager.clone() }));
    step_manager.register_worker(Arc::new(AlwaysFailsWorker));
    let dispatcher = make_dispatcher(job_manager.clone(), step_manager);

    let step_a = minimal_step("a", "crawl");
    let mut step_b = minimal_step("b", "failing");
    step_b.on_error = OnError::Fatal;

    let jobdef = minimal_jobdef(vec![step_a, step_b]);
    let cancel = CancellationToken::new();
    let step_monitor: Arc<dyn StepMonitor> = Arc::new(RecordingStepMonitor::new());
    let manager_id =
        dispatcher.execute_job_definition(&jobdef, &cancel, None, Some(&step_monitor)).await.unwrap();

    let manager = job_manager.store().get_job(manager_id).unwrap();
    assert_eq!(manager.status, JobStatus::Failed);

    // step a's leaf was pending; fatal on step b should have cancelled it.
    let steps: Vec<StepStatEntry> =
        serde_json::from_value(manager.metadata.get(meta::STEP_STATS).cloned().unwrap()).unwrap();
    let step_a_id = steps[0].id;
    let leaves = job_manager.store().get_child_jobs(step_a_id).unwrap();
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].status, JobStatus::Cancelled);
}

#[tokio::test]
async fn cache_hit_skips_worker_invocation() {
    let job_manager = make_job_manager();
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_000);
    let docs = Arc::new(FakeDocumentStore::new());
    docs.insert(jobtree_storage::DocumentRecord {
        jobdef_id: "jd1".into(),
        step_name: "s1".into(),
        revision: 1,
        content_hash: None,
        last_synced_ms: 0,
    });
    let cache = CacheService::new(docs, clock);
    let mut step_manager: TestStepManager = StepManager::new().with_cache_service(cache);
    step_manager.register_worker(Arc::new(SpawnsPendingWorker { job_manager: job_manager.clone() }));
    let dispatcher = make_dispatcher(job_manager.clone(), step_manager);

    let mut step = minimal_step("s1", "crawl");
    step.config.insert("cache".to_string(), json!({"enabled": true, "type": "rolling_time", "hours": 24}));
    let jobdef = minimal_jobdef(vec![step]);
    let cancel = CancellationToken::new();
    let manager_id = dispatcher.execute_job_definition(&jobdef, &cancel, None, None).await.unwrap();

    let manager = job_manager.store().get_job(manager_id).unwrap();
    assert_eq!(manager.status, JobStatus::Completed);
    let steps: Vec<StepStatEntry> =
        serde_json::from_value(manager.metadata.get(meta::STEP_STATS).cloned().unwrap()).unwrap();
    assert_eq!(steps[0].child_count, 0);
}

#[tokio::test]
async fn error_tolerance_stop_all_fails_manager_without_on_error_fatal() {
    let job_manager = make_job_manager();
    let mut step_manager: TestStepManager = StepManager::new().with_cache_service(cache_service(&job_manager));
    step_manager.register_worker(Arc::new(AlwaysFailsWorker));
    let dispatcher = make_dispatcher(job_manager.clone(), step_manager);

    let mut step_a = minimal_step("a", "failing");
    step_a.on_error = OnError::Continue;
    let mut jobdef = minimal_jobdef(vec![step_a]);
    jobdef.error_tolerance =
        Some(ErrorTolerance { max_child_failures: 1, failure_action: jobtree_core::FailureAction::StopAll });

    let cancel = CancellationToken::new();
    let manager_id = dispatcher.execute_job_definition(&jobdef, &cancel, None, None).await.unwrap();
    let manager = job_manager.store().get_job(manager_id).unwrap();
    assert_eq!(manager.status, JobStatus::Failed);
}
