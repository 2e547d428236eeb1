//! P9 graceful resume: a job that was `running` when the process stopped
//! comes back `pending` after `WorkerPool::stop()`, survives an on-disk
//! reopen (crash-equivalent, no explicit checkpoint), and a fresh
//! `WorkerPool::start()` against the reopened store finishes it.

use crate::prelude::*;
use jobtree_core::{JobMessage, JobNode};
use jobtree_storage::{JobStore, Queue};

#[tokio::test]
async fn running_job_resumes_as_pending_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let manager_id = JobId::new();
    let leaf_id = JobId::new();

    {
        let store = Arc::new(Store::open(dir.path(), FakeClock::new()).unwrap());
        let job_manager = job_manager_over(Arc::clone(&store));

        job_manager.create_manager_job(manager_id, "durability-mgr").unwrap();
        job_manager
            .create_child_job(leaf_id, manager_id, manager_id, NodeKind::Worker("crawl-leaf".to_string()), "leaf-0")
            .unwrap();
        job_manager.update_job_status(leaf_id, JobStatus::Running, None).unwrap();

        let message = JobMessage::new(leaf_id, "crawl-leaf".to_string());
        let payload = message.encode().unwrap();
        store.enqueue(leaf_id, "crawl-leaf".to_string(), payload).unwrap();

        // No `checkpoint()` here: recovery must come purely from WAL replay,
        // the same path a hard-crash (no graceful `stop()`) would take.
    }

    let reopened: Arc<SpecStore> = Arc::new(Store::open(dir.path(), FakeClock::new()).unwrap());
    let reopened_job: JobNode = reopened.get_job(leaf_id).unwrap();
    assert_eq!(reopened_job.status, JobStatus::Running);

    let job_manager = job_manager_over(Arc::clone(&reopened));
    let resumed = reopened.mark_running_jobs_as_pending("service shutdown — will resume", 10).unwrap();
    assert_eq!(resumed, 1);
    assert_eq!(reopened.get_job(leaf_id).unwrap().status, JobStatus::Pending);

    let handler = Arc::new(RecordingLeafWorker { job_manager: job_manager.clone(), leaf_type: "crawl-leaf".to_string() });
    let pool = fast_worker_pool(job_manager.clone(), vec![handler]);
    let _handles = pool.start();

    wait_until(|| reopened.get_job(leaf_id).map(|j| j.status == JobStatus::Completed).unwrap_or(false)).await;
    assert_eq!(job_manager.get_document_count(manager_id).unwrap(), 1);
}
