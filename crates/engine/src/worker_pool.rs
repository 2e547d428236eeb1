// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Worker Pool (`§4.8`): the queue-side consumer that executes leaf
//! jobs. `concurrency` staggered loops receive messages, route them by
//! `message.type` to a registered `LeafWorker`, and reconcile the leaf's
//! terminal status once the handler returns.
//!
//! This is distinct from the `jobtree_core::Worker` trait the
//! `StepManager` drives: that one expands a step into leaf jobs; this
//! one executes a single already-enqueued leaf job.

use crate::backend::Backend;
use crate::error::WorkerPoolError;
use crate::job_manager::JobManager;
use jobtree_core::{Clock, CoreError, Event, JobId, JobMessage, JobNode, JobStatus, LogLevel};
use jobtree_storage::{JobStore, Queue, QueueConfig, QueueError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Worker Pool defaults (`§4.8`).
impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            concurrency: 5,
            visibility_timeout: Duration::from_secs(5 * 60),
            max_receive: 3,
            queue_name: "jobs".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub poll_interval: Duration,
    pub concurrency: usize,
    pub visibility_timeout: Duration,
    pub max_receive: u32,
    pub queue_name: String,
}

impl WorkerPoolConfig {
    fn queue_config(&self) -> QueueConfig {
        QueueConfig { visibility_timeout_ms: self.visibility_timeout.as_millis() as u64, max_receive: self.max_receive }
    }
}

/// Backoff schedule for an empty queue: 100ms doubling up to 5s (`§4.8`).
const BACKOFF_START: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Delete-retry schedule on transient store contention (`§4.8`).
const DELETE_RETRY_DELAYS: [Duration; 3] =
    [Duration::from_millis(200), Duration::from_millis(400), Duration::from_millis(800)];

/// Context passed to a `LeafWorker::execute` invocation.
pub struct LeafContext<'a> {
    pub job: &'a JobNode,
    pub message: &'a JobMessage,
}

/// A typed handler for one leaf-job type, invoked by the Worker Pool once
/// a message is dequeued (`§4.8` step 7). Distinct from
/// `jobtree_core::Worker`, which the dispatcher uses to *produce* leaf
/// jobs rather than execute them.
#[async_trait::async_trait]
pub trait LeafWorker: Send + Sync {
    fn get_type(&self) -> &str;

    async fn execute(&self, ctx: &LeafContext<'_>, cancel: &CancellationToken) -> Result<(), CoreError>;
}

pub struct WorkerPool<S, C> {
    job_manager: JobManager<S, C>,
    handlers: HashMap<String, Arc<dyn LeafWorker>>,
    config: WorkerPoolConfig,
    clock: C,
    active_jobs: Arc<RwLock<HashMap<JobId, CancellationToken>>>,
    shutdown: CancellationToken,
}

impl<S, C> WorkerPool<S, C>
where
    S: Backend + 'static,
    C: Clock + 'static,
{
    pub fn new(job_manager: JobManager<S, C>, config: WorkerPoolConfig, clock: C) -> Arc<Self> {
        let pool = Arc::new(Self {
            job_manager,
            handlers: HashMap::new(),
            config,
            clock,
            active_jobs: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        });
        pool.subscribe_cancellation();
        pool
    }

    pub fn with_handlers(job_manager: JobManager<S, C>, config: WorkerPoolConfig, clock: C, handlers: Vec<Arc<dyn LeafWorker>>) -> Arc<Self> {
        let pool = Self::new(job_manager, config, clock);
        // `Arc::get_mut` is safe here: `subscribe_cancellation` only cloned
        // the `active_jobs` map, not `pool` itself, so the strong count is 1.
        let mut pool = pool;
        if let Some(inner) = Arc::get_mut(&mut pool) {
            for handler in handlers {
                inner.handlers.insert(handler.get_type().to_string(), handler);
            }
        }
        pool
    }

    fn subscribe_cancellation(&self) {
        let active_jobs = Arc::clone(&self.active_jobs);
        self.job_manager.events().subscribe(
            "JobCancelled",
            Arc::new(move |event| {
                if let Event::JobCancelled { job_id, .. } = event {
                    if let Some(token) = active_jobs.read().get(&job_id) {
                        token.cancel();
                    }
                }
            }),
        );
    }

    /// Launch `concurrency` worker loops, staggered by `poll_interval /
    /// concurrency` to reduce contention on the shared queue (`§4.8`).
    pub fn start(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let concurrency = self.config.concurrency.max(1);
        let stagger = self.config.poll_interval / concurrency as u32;
        (0..concurrency)
            .map(|index| {
                let pool = Arc::clone(self);
                let delay = stagger * index as u32;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    pool.supervise_loop(index).await;
                })
            })
            .collect()
    }

    /// Graceful shutdown (`§4.8`): mark every currently `running` job
    /// `pending` so a future `start()` can resume it, cancel the pool's
    /// context, and give in-flight handlers a moment to observe it.
    pub async fn stop(&self) -> Result<u64, WorkerPoolError> {
        let resumed = self
            .job_manager
            .store()
            .mark_running_jobs_as_pending("service shutdown — will resume", self.clock.epoch_ms())?;
        self.shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(resumed)
    }

    /// Per-loop panic discipline (`§7`): a panic inside the loop body is
    /// caught at the task boundary tokio already gives a spawned future;
    /// translate that into the crash-file-and-exit behavior `§4.8`
    /// describes, rather than letting one loop's panic silently vanish.
    async fn supervise_loop(self: Arc<Self>, index: usize) {
        let pool = Arc::clone(&self);
        let handle = tokio::spawn(async move { pool.run_loop(index).await });
        if let Err(join_err) = handle.await {
            if join_err.is_panic() {
                tracing::error!(loop_index = index, "worker pool loop panicked, writing crash marker");
                write_crash_marker(index, &join_err);
                std::process::exit(1);
            }
        }
    }

    async fn run_loop(self: Arc<Self>, index: usize) {
        let mut backoff = BACKOFF_START;
        loop {
            if self.shutdown.is_cancelled() {
                tracing::debug!(loop_index = index, "worker loop stopping");
                return;
            }

            match self.job_manager.store().receive(&self.config.queue_config()) {
                Ok(message) => {
                    backoff = BACKOFF_START;
                    self.process_message(message).await;
                }
                Err(QueueError::NoMessage) => {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
                Err(QueueError::Store(err)) => {
                    tracing::warn!(loop_index = index, error = %err, "queue receive failed");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
            }
        }
    }

    /// Per-job panic discipline (`§7`): the handler body runs on its own
    /// task so a panic there is caught at the join boundary and demoted to
    /// a normal failure instead of taking the whole loop down.
    async fn process_message(self: &Arc<Self>, message: jobtree_core::QueueMessage) {
        let job_id = message.job_id;
        let message_id = message.id;
        let pool = Arc::clone(self);
        let handle = tokio::spawn(async move { pool.handle_message(message).await });

        match handle.await {
            Ok(outcome) => {
                if let Err(err) = outcome {
                    tracing::error!(job_id = %job_id, error = %err, "leaf job execution failed");
                }
            }
            Err(join_err) if join_err.is_panic() => {
                tracing::error!(job_id = %job_id, "leaf handler panicked");
                let _ = self.job_manager.update_job_status(job_id, JobStatus::Failed, Some("worker panicked".to_string()));
                self.delete_with_retry(message_id).await;
            }
            Err(_) => {}
        }
    }

    async fn handle_message(self: Arc<Self>, message: jobtree_core::QueueMessage) -> Result<(), WorkerPoolError> {
        let job_id = message.job_id;

        // (3) Decode + validate.
        let decoded = JobMessage::decode(&message.payload);
        let job_message = match decoded {
            Ok(m) => m,
            Err(_) => {
                self.job_manager.update_job_status(job_id, JobStatus::Failed, Some("invalid queue message".to_string()))?;
                self.delete_with_retry(message.id).await;
                return Ok(());
            }
        };

        // (4) Re-check status: a cancellation may have landed while the
        // message sat in the queue.
        let job = self.job_manager.store().get_job(job_id)?;
        if job.status == JobStatus::Cancelled {
            self.delete_with_retry(message.id).await;
            return Ok(());
        }

        // (5) Handler lookup.
        let Some(handler) = self.handlers.get(&job_message.job_type).cloned() else {
            self.job_manager.update_job_status(job_id, JobStatus::Failed, Some(format!("no handler for type {:?}", job_message.job_type)))?;
            self.delete_with_retry(message.id).await;
            return Ok(());
        };

        // (6) Register cancellation, derive a cancellable context.
        let token = CancellationToken::new();
        self.active_jobs.write().insert(job_id, token.clone());
        let _guard = ActiveJobGuard { pool: &self, job_id };

        let ctx = LeafContext { job: &job, message: &job_message };
        let started_at_ms = self.clock.epoch_ms();
        self.job_manager.update_job_metadata(job_id, progress_started(started_at_ms))?;

        // (7) Execute.
        let result = handler.execute(&ctx, &token).await;

        // (8) Cancelled while running.
        if token.is_cancelled() {
            self.job_manager.update_job_status(job_id, JobStatus::Cancelled, None)?;
            self.job_manager.set_job_finished(job_id)?;
            self.delete_with_retry(message.id).await;
            return Ok(());
        }

        match result {
            // (9) Failure.
            Err(err) => {
                let hierarchy = self.job_manager.resolve_job_hierarchy(job_id)?;
                let log_target = hierarchy.step_id.unwrap_or(job_id);
                self.job_manager.add_job_log(log_target, LogLevel::Error, format!("leaf job failed: {err}"))?;
                self.job_manager.update_job_status(job_id, JobStatus::Failed, Some(err.to_string()))?;
                self.job_manager.set_job_finished(job_id)?;
            }
            // (10) Success. A `parent`-typed leaf is finalized by a
            // monitor watching its own descendants, not here.
            Ok(()) => {
                if job_message.job_type != "parent" {
                    self.job_manager.update_job_status(job_id, JobStatus::Completed, None)?;
                    self.job_manager.set_job_finished(job_id)?;
                }
            }
        }

        self.delete_with_retry(message.id).await;
        Ok(())
    }

    async fn delete_with_retry(&self, id: jobtree_core::MessageId) {
        for (attempt, delay) in DELETE_RETRY_DELAYS.iter().enumerate() {
            match self.job_manager.store().delete(id) {
                Ok(()) => return,
                Err(QueueError::Store(err)) if err.is_transient() => {
                    tracing::warn!(attempt, error = %err, "message delete contended, retrying");
                    tokio::time::sleep(*delay).await;
                }
                Err(err) => {
                    tracing::error!(error = %err, "message delete failed, will be redelivered by visibility timeout");
                    return;
                }
            }
        }
        tracing::error!("message delete exhausted retries, will be redelivered by visibility timeout");
    }
}

struct ActiveJobGuard<'a, S, C> {
    pool: &'a Arc<WorkerPool<S, C>>,
    job_id: JobId,
}

impl<'a, S, C> Drop for ActiveJobGuard<'a, S, C> {
    fn drop(&mut self) {
        self.pool.active_jobs.write().remove(&self.job_id);
    }
}

fn progress_started(now_ms: u64) -> HashMap<String, serde_json::Value> {
    let mut patch = HashMap::new();
    patch.insert("started_at_ms".to_string(), serde_json::Value::from(now_ms));
    patch
}

fn write_crash_marker(loop_index: usize, join_err: &tokio::task::JoinError) {
    let marker = std::env::temp_dir().join(format!("jobtree-worker-pool-crash-{loop_index}.log"));
    let _ = std::fs::write(&marker, format!("worker pool loop {loop_index} panicked: {join_err}"));
}

#[cfg(test)]
#[path = "worker_pool_tests.rs"]
mod tests;
