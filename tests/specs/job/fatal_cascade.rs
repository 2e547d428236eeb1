//! `on_error = fatal` must cancel every pending/running descendant
//! (`P6`/`P10`), and a `WorkerPool` that later dequeues one of those
//! now-cancelled leaves' messages must not execute it (`§4.8` step 4:
//! "re-check status").

use crate::prelude::*;

#[tokio::test]
async fn fatal_step_failure_cancels_pending_leaves_before_the_pool_ever_runs_them() {
    let job_manager = in_memory_job_manager();

    let mut step_manager = SpecStepManager::new();
    step_manager.register_worker(Arc::new(EnqueueingWorker {
        job_manager: job_manager.clone(),
        leaf_type: "slow".to_string(),
        n: 2,
    }));
    step_manager.register_worker(Arc::new(AlwaysFailsWorker));
    let step_manager = step_manager.with_cache_service(cache_service());

    let dispatcher = dispatcher_for(job_manager.clone(), step_manager);
    let jobdef = minimal_jobdef(vec![
        minimal_step("a", "crawl"),
        step_with_error_policy("b", "failing", OnError::Fatal),
    ]);

    let step_monitor: Arc<dyn StepMonitor> = Arc::new(NoOpStepMonitor);
    let cancel = CancellationToken::new();
    let manager_id = dispatcher
        .execute_job_definition(&jobdef, &cancel, None, Some(&step_monitor))
        .await
        .unwrap();

    let manager = job_manager.store().get_job(manager_id).unwrap();
    assert_eq!(manager.status, JobStatus::Failed);

    let stats = jobtree_engine::read_step_stats(&manager);
    let step_a_id = stats.iter().find(|s| s.name == "a").unwrap().id;
    assert_eq!(job_manager.store().get_job(step_a_id).unwrap().status, JobStatus::Cancelled);

    let leaves = job_manager
        .store()
        .list_jobs(&jobtree_storage::JobFilter { parent_id: Some(step_a_id), ..Default::default() })
        .unwrap();
    assert_eq!(leaves.len(), 2);
    for leaf in &leaves {
        assert_eq!(leaf.status, JobStatus::Cancelled);
    }

    // The two leaf messages are still sitting in the queue. A worker pool
    // that only now comes online must see the cancellation and skip
    // execution entirely rather than run stale work.
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let handler = Arc::new(CountingLeafWorker { leaf_type: "slow".to_string(), calls: Arc::clone(&calls) });
    let pool = fast_worker_pool(job_manager.clone(), vec![handler]);
    let _handles = pool.start();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    for leaf in &leaves {
        assert_eq!(job_manager.store().get_job(leaf.id).unwrap().status, JobStatus::Cancelled);
    }
}

struct CountingLeafWorker {
    leaf_type: String,
    calls: Arc<std::sync::atomic::AtomicUsize>,
}

#[async_trait]
impl jobtree_engine::worker_pool::LeafWorker for CountingLeafWorker {
    fn get_type(&self) -> &str {
        &self.leaf_type
    }
    async fn execute(&self, _ctx: &jobtree_engine::worker_pool::LeafContext<'_>, _cancel: &CancellationToken) -> Result<(), CoreError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
