//! A step spawns leaves into the real persistent queue, a genuinely
//! concurrent `WorkerPool` drains them, and the `Dispatcher`'s inline
//! wait loop (no `StepMonitor` registered) observes the tally flip to
//! all-terminal and finalizes the step and the manager.

use crate::prelude::*;

#[tokio::test]
async fn step_children_are_executed_by_a_real_worker_pool_and_step_completes() {
    let job_manager = in_memory_job_manager();

    let mut step_manager = SpecStepManager::new();
    step_manager.register_worker(Arc::new(EnqueueingWorker {
        job_manager: job_manager.clone(),
        leaf_type: "crawl-leaf".to_string(),
        n: 3,
    }));
    let step_manager = step_manager.with_cache_service(cache_service());

    let dispatcher = dispatcher_for(job_manager.clone(), step_manager);
    let jobdef = minimal_jobdef(vec![minimal_step("s1", "crawl")]);

    let pool = fast_worker_pool(
        job_manager.clone(),
        vec![Arc::new(RecordingLeafWorker { job_manager: job_manager.clone(), leaf_type: "crawl-leaf".to_string() })],
    );
    let _handles = pool.start();

    let cancel = CancellationToken::new();
    let manager_id = dispatcher.execute_job_definition(&jobdef, &cancel, None, None).await.unwrap();

    let manager = job_manager.store().get_job(manager_id).unwrap();
    assert_eq!(manager.status, JobStatus::Completed);
    assert_eq!(job_manager.get_document_count(manager_id).unwrap(), 3);

    let stats = jobtree_engine::read_step_stats(&manager);
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].status, JobStatus::Completed);
    assert_eq!(stats[0].child_count, 3);
}
