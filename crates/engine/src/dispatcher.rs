// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Dispatcher (`§4.7`): expands a job definition into the manager →
//! step → leaf job tree, drives steps sequentially, resolves config
//! placeholders, evaluates dependencies and `on_error` policy, and either
//! waits inline for a step's children or hands off to a `StepMonitor` /
//! `JobMonitor`.

use crate::backend::Backend;
use crate::error::DispatchError;
use crate::job_manager::{JobManager, StepStatEntry};
use crate::meta;
use crate::placeholder::{resolve_placeholders, KvStore};
use crate::step_manager::StepManager;
use indexmap::IndexMap;
use jobtree_core::{
    Clock, Event, FailureAction, JobDefinition, JobId, JobMonitor, JobStatus, LogLevel, NodeKind,
    OnError, StepDefinition, StepMonitor,
};
use jobtree_storage::DocumentStore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Wait-loop poll cadence (`§5`).
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Wait-loop `StepProgress` publish cadence (`§5`).
const PROGRESS_PUBLISH_INTERVAL: Duration = Duration::from_secs(2);

/// Outcome of driving one step to the point it either finalizes
/// synchronously or is handed to a monitor.
enum ControlFlow {
    Continue,
    AbortManager,
}

pub struct Dispatcher<S, C, D> {
    job_manager: JobManager<S, C>,
    step_manager: Arc<StepManager<D, C>>,
    kv: Arc<dyn KvStore>,
    clock: C,
}

impl<S, C, D> Clone for Dispatcher<S, C, D>
where
    C: Clone,
{
    fn clone(&self) -> Self {
        Self {
            job_manager: self.job_manager.clone(),
            step_manager: Arc::clone(&self.step_manager),
            kv: Arc::clone(&self.kv),
            clock: self.clock.clone(),
        }
    }
}

impl<S, C, D> Dispatcher<S, C, D>
where
    S: Backend + 'static,
    C: Clock + 'static,
    D: DocumentStore + 'static,
{
    pub fn new(
        job_manager: JobManager<S, C>,
        step_manager: Arc<StepManager<D, C>>,
        kv: Arc<dyn KvStore>,
        clock: C,
    ) -> Self {
        Self { job_manager, step_manager, kv, clock }
    }

    pub fn job_manager(&self) -> &JobManager<S, C> {
        &self.job_manager
    }

    /// Synchronously create a manager node so a caller can return a
    /// handle immediately (`§4.7`).
    pub fn create_manager_job(&self, jobdef: &JobDefinition) -> Result<JobId, DispatchError> {
        let manager_id = JobId::new();
        self.job_manager.create_manager_job(manager_id, jobdef.name.clone())?;
        Ok(manager_id)
    }

    pub async fn execute_job_definition(
        &self,
        jobdef: &JobDefinition,
        cancel: &CancellationToken,
        job_monitor: Option<&Arc<dyn JobMonitor>>,
        step_monitor: Option<&Arc<dyn StepMonitor>>,
    ) -> Result<JobId, DispatchError> {
        let manager_id = self.create_manager_job(jobdef)?;
        self.execute_job_definition_with_id(manager_id, jobdef, cancel, job_monitor, step_monitor).await
    }

    /// Same as `execute_job_definition` but reuses a pre-created manager
    /// (`§4.7`).
    pub async fn execute_job_definition_with_id(
        &self,
        manager_id: JobId,
        jobdef: &JobDefinition,
        cancel: &CancellationToken,
        job_monitor: Option<&Arc<dyn JobMonitor>>,
        step_monitor: Option<&Arc<dyn StepMonitor>>,
    ) -> Result<JobId, DispatchError> {
        self.job_manager.update_job_status(manager_id, JobStatus::Running, None)?;

        let mut failed_steps: Vec<String> = Vec::new();
        let mut step_job_ids: IndexMap<String, JobId> = IndexMap::new();
        let mut step_stats: Vec<StepStatEntry> = Vec::new();
        let mut last_validation_error: Option<String> = None;
        let mut any_spawned_to_monitor = false;
        let total_steps = jobdef.steps.len();

        'steps: for (index, step) in jobdef.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                break 'steps;
            }

            // (a) Dependency check.
            if let Some(failed_dep) = step.depends_on().into_iter().find(|d| failed_steps.contains(&d.to_string()))
            {
                if !step.always_run {
                    let step_id = self.create_skipped_step(manager_id, index, step, failed_dep)?;
                    failed_steps.push(step.name.clone());
                    step_job_ids.insert(step.name.clone(), step_id);
                    step_stats.push(StepStatEntry {
                        index,
                        id: step_id,
                        name: step.name.clone(),
                        step_type: step.step_type.clone(),
                        child_count: 0,
                        document_count: 0,
                        status: JobStatus::Skipped,
                    });
                    self.persist_manager_progress(manager_id, &step_job_ids, &step_stats)?;

                    match step.on_error {
                        OnError::Continue => continue 'steps,
                        OnError::Fail => {
                            self.finalize_manager_failed(manager_id, "dependency failed")?;
                            return Ok(manager_id);
                        }
                        OnError::Fatal => {
                            self.job_manager.stop_all_child_jobs(manager_id)?;
                            self.finalize_manager_failed(manager_id, "dependency failed")?;
                            return Ok(manager_id);
                        }
                    }
                }
            }

            // (b) Step record.
            let step_id = JobId::new();
            self.job_manager.create_child_job(
                step_id,
                manager_id,
                manager_id,
                NodeKind::Step,
                step.name.clone(),
            )?;
            let mut step_meta = HashMap::new();
            step_meta.insert(meta::MANAGER_ID.to_string(), json!(manager_id));
            step_meta.insert(meta::STEP_INDEX.to_string(), json!(index));
            step_meta.insert(meta::STEP_NAME.to_string(), json!(step.name));
            step_meta.insert(meta::STEP_TYPE.to_string(), json!(step.step_type));
            step_meta.insert(meta::JOB_DEFINITION_ID.to_string(), json!(jobdef.id));
            if let Some(description) = &step.description {
                step_meta.insert(meta::DESCRIPTION.to_string(), json!(description));
            }
            if let Some(auth_id) = &jobdef.auth_id {
                step_meta.insert(meta::AUTH_ID.to_string(), json!(auth_id));
            }
            self.job_manager.update_job_metadata(step_id, step_meta)?;

            // (c) Mark running.
            self.job_manager.update_job_status(step_id, JobStatus::Running, None)?;
            step_job_ids.insert(step.name.clone(), step_id);
            let mut current = HashMap::new();
            current.insert(meta::CURRENT_STEP_NAME.to_string(), json!(step.name));
            current.insert(meta::CURRENT_STEP_ID.to_string(), json!(step_id));
            current.insert(meta::CURRENT_STEP_STATUS.to_string(), json!(JobStatus::Running.to_string()));
            current.insert(meta::STEP_JOB_IDS.to_string(), serde_json::to_value(&step_job_ids).unwrap_or(Value::Null));
            self.job_manager.update_job_metadata(manager_id, current)?;
            self.job_manager.events().publish(Event::JobProgress {
                job_id: manager_id,
                step_id,
                step_index: index,
                step_name: step.name.clone(),
                step_type: step.step_type.clone(),
                current_step: index + 1,
                total_steps,
                step_status: JobStatus::Running.to_string(),
                step_child_count: None,
                timestamp_ms: self.clock.epoch_ms(),
            });

            // (d) Placeholder resolution.
            let resolved_config = resolve_placeholders(&serde_json::to_value(&step.config).unwrap_or(Value::Null), self.kv.as_ref());
            let resolved_config: HashMap<String, Value> =
                serde_json::from_value(resolved_config).unwrap_or_else(|_| step.config.clone());
            let resolved_step = StepDefinition { config: resolved_config, ..step.clone() };

            // (e) Init phase.
            let init_result = match self.step_manager.init(&resolved_step, jobdef).await {
                Ok(r) => r,
                Err(err) => {
                    match self
                        .handle_step_failure(manager_id, step_id, index, step, &err, jobdef, &mut step_stats, &mut last_validation_error)
                        .await?
                    {
                        ControlFlow::Continue => continue 'steps,
                        ControlFlow::AbortManager => return Ok(manager_id),
                    }
                }
            };

            // (f) Execute phase.
            let doc_count_before = self.job_manager.get_document_count(manager_id)?;
            // Log ordering: announce before calling execute for child-producing workers.
            if self.step_manager.get_worker(&resolved_step.step_type).map(|w| w.returns_child_jobs()).unwrap_or(false) {
                self.job_manager.add_job_log(step_id, LogLevel::Info, "Spawning child jobs...")?;
            }
            let outcome = match self.step_manager.execute(&resolved_step, jobdef, step_id, &init_result).await {
                Ok(o) => o,
                Err(err) => {
                    match self
                        .handle_step_failure(manager_id, step_id, index, step, &err, jobdef, &mut step_stats, &mut last_validation_error)
                        .await?
                    {
                        ControlFlow::Continue => continue 'steps,
                        ControlFlow::AbortManager => return Ok(manager_id),
                    }
                }
            };

            if outcome.cache_hit {
                self.job_manager.add_job_log(step_id, LogLevel::Info, "Cache hit")?;
            }

            // (g) Post-execute.
            let produces_children = self
                .step_manager
                .get_worker(&resolved_step.step_type)
                .map(|w| w.returns_child_jobs())
                .unwrap_or(false)
                && !outcome.cache_hit;

            let mut finalize_now = true;
            if produces_children {
                let stats = self.job_manager.get_job_child_stats(&[step_id])?;
                let stats = stats.get(&step_id).copied().unwrap_or_default();
                if stats.pending + stats.running == 0 {
                    self.job_manager.add_job_log(
                        step_id,
                        LogLevel::Info,
                        format!("Step '{}' children already terminal on return", step.name),
                    )?;
                } else if let Some(monitor) = step_monitor {
                    monitor.start_monitoring(step_id).await.map_err(DispatchError::Core)?;
                    any_spawned_to_monitor = true;
                    finalize_now = false;
                } else {
                    self.wait_for_step_children(manager_id, step_id, &step.name, jobdef.timeout(), cancel).await?;
                }
            } else {
                self.job_manager.add_job_log(step_id, LogLevel::Info, format!("Step '{}' completed", step.name))?;
            }

            let doc_count_after = self.job_manager.get_document_count(manager_id)?;
            let step_doc_count = doc_count_after.saturating_sub(doc_count_before);

            if finalize_now {
                let child_stats = self.job_manager.get_job_child_stats(&[step_id])?;
                let child_count = child_stats.get(&step_id).map(|s| s.child_count).unwrap_or(0);
                self.job_manager.update_job_status(step_id, JobStatus::Completed, None)?;
                step_stats.push(StepStatEntry {
                    index,
                    id: step_id,
                    name: step.name.clone(),
                    step_type: step.step_type.clone(),
                    child_count,
                    document_count: step_doc_count,
                    status: JobStatus::Completed,
                });
                self.job_manager.events().publish(Event::StepProgress {
                    step_id,
                    manager_id,
                    step_name: step.name.clone(),
                    status: JobStatus::Completed.to_string(),
                    pending_jobs: Some(0),
                    running_jobs: Some(0),
                    completed_jobs: None,
                    failed_jobs: None,
                    timestamp_ms: self.clock.epoch_ms(),
                });
                self.job_manager.events().publish(Event::JobUpdate { job_id: step_id, timestamp_ms: self.clock.epoch_ms() });
            } else {
                // Still running; the monitor owns finalization. Record a
                // provisional entry so `step_stats` reflects the spawn.
                step_stats.push(StepStatEntry {
                    index,
                    id: step_id,
                    name: step.name.clone(),
                    step_type: step.step_type.clone(),
                    child_count: self
                        .job_manager
                        .get_job_child_stats(&[step_id])?
                        .get(&step_id)
                        .map(|s| s.child_count)
                        .unwrap_or(0),
                    document_count: step_doc_count,
                    status: JobStatus::Running,
                });
            }

            // (i) Update manager metadata with current step progress.
            self.persist_manager_progress(manager_id, &step_job_ids, &step_stats)?;
        }

        // (j) After the loop.
        let mut final_meta = HashMap::new();
        final_meta.insert(meta::STEP_JOB_IDS.to_string(), serde_json::to_value(&step_job_ids).unwrap_or(Value::Null));
        self.job_manager.update_job_metadata(manager_id, final_meta)?;

        if any_spawned_to_monitor {
            if let Some(monitor) = job_monitor {
                monitor.start_monitoring(manager_id).await.map_err(DispatchError::Core)?;
                return Ok(manager_id);
            }
        }

        if let Some(error) = last_validation_error {
            self.job_manager.update_job_status(manager_id, JobStatus::Failed, Some(error))?;
        } else {
            self.job_manager.update_job_status(manager_id, JobStatus::Completed, None)?;
        }
        self.job_manager.set_job_finished(manager_id)?;
        Ok(manager_id)
    }

    fn create_skipped_step(
        &self,
        manager_id: JobId,
        index: usize,
        step: &StepDefinition,
        failed_dep: &str,
    ) -> Result<JobId, DispatchError> {
        let step_id = JobId::new();
        self.job_manager.create_child_job(step_id, manager_id, manager_id, NodeKind::Step, step.name.clone())?;
        let mut patch = HashMap::new();
        patch.insert(meta::MANAGER_ID.to_string(), json!(manager_id));
        patch.insert(meta::STEP_INDEX.to_string(), json!(index));
        patch.insert(meta::STEP_NAME.to_string(), json!(step.name));
        patch.insert(meta::STEP_TYPE.to_string(), json!(step.step_type));
        patch.insert(meta::SKIP_REASON.to_string(), json!(format!("dependency '{failed_dep}' failed")));
        self.job_manager.update_job_metadata(step_id, patch)?;
        self.job_manager.add_job_log(
            step_id,
            LogLevel::Warn,
            format!("Skipping step '{}': dependency '{failed_dep}' failed", step.name),
        )?;
        self.job_manager.update_job_status(step_id, JobStatus::Skipped, None)?;
        Ok(step_id)
    }

    fn persist_manager_progress(
        &self,
        manager_id: JobId,
        step_job_ids: &IndexMap<String, JobId>,
        step_stats: &[StepStatEntry],
    ) -> Result<(), DispatchError> {
        let mut patch = HashMap::new();
        patch.insert(meta::STEP_JOB_IDS.to_string(), serde_json::to_value(step_job_ids).unwrap_or(Value::Null));
        patch.insert(meta::STEP_STATS.to_string(), serde_json::to_value(step_stats).unwrap_or(Value::Null));
        self.job_manager.update_job_metadata(manager_id, patch)
    }

    fn finalize_manager_failed(&self, manager_id: JobId, error: impl Into<String>) -> Result<(), DispatchError> {
        self.job_manager.update_job_status(manager_id, JobStatus::Failed, Some(error.into()))?;
        self.job_manager.set_job_finished(manager_id)
    }

    /// Failure handling shared by the Init and Execute phases (`§4.7` (e)/(f),
    /// `§7`). Increments the manager's `failed_child_count` and checks the
    /// jobdef's `error_tolerance` before applying the step's `on_error`.
    #[allow(clippy::too_many_arguments)]
    async fn handle_step_failure(
        &self,
        manager_id: JobId,
        step_id: JobId,
        index: usize,
        step: &StepDefinition,
        error: &DispatchError,
        jobdef: &JobDefinition,
        step_stats: &mut Vec<StepStatEntry>,
        last_validation_error: &mut Option<String>,
    ) -> Result<ControlFlow, DispatchError> {
        self.job_manager.add_job_log(step_id, LogLevel::Error, format!("Step failed: {error}"))?;
        self.job_manager.update_job_status(step_id, JobStatus::Failed, Some(error.to_string()))?;
        step_stats.push(StepStatEntry {
            index,
            id: step_id,
            name: step.name.clone(),
            step_type: step.step_type.clone(),
            child_count: 0,
            document_count: 0,
            status: JobStatus::Failed,
        });

        let failed_count = self.job_manager.increment_failed_child_count(manager_id)?;
        let tolerance = jobdef.error_tolerance();
        if failed_count >= tolerance.max_child_failures && tolerance.failure_action == FailureAction::StopAll {
            self.finalize_manager_failed(manager_id, error.to_string())?;
            return Ok(ControlFlow::AbortManager);
        }

        match step.on_error {
            OnError::Continue => {
                *last_validation_error = Some(error.to_string());
                self.job_manager.add_job_error(manager_id, format!("step '{}' failed: {error}", step.name))?;
                Ok(ControlFlow::Continue)
            }
            OnError::Fail => {
                self.finalize_manager_failed(manager_id, error.to_string())?;
                Ok(ControlFlow::AbortManager)
            }
            OnError::Fatal => {
                self.job_manager.stop_all_child_jobs(manager_id)?;
                self.finalize_manager_failed(manager_id, error.to_string())?;
                Ok(ControlFlow::AbortManager)
            }
        }
    }

    /// The inline wait loop (`§5`): poll every 500ms, log when the tally
    /// changes, publish `StepProgress` every 2s, break when
    /// `pending + running = 0`.
    async fn wait_for_step_children(
        &self,
        manager_id: JobId,
        step_id: JobId,
        step_name: &str,
        wait_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), DispatchError> {
        let wait_start = Instant::now();
        let mut last_tally = String::new();
        let mut last_publish = Instant::now() - PROGRESS_PUBLISH_INTERVAL;

        loop {
            if cancel.is_cancelled() {
                return Err(DispatchError::Core(jobtree_core::CoreError::Cancelled));
            }
            if wait_start.elapsed() > wait_timeout {
                return Err(DispatchError::Timeout(wait_timeout));
            }

            let stats = self.job_manager.get_job_child_stats(&[step_id])?;
            let stats = stats.get(&step_id).copied().unwrap_or_default();
            let tally = format!(
                "pending={} running={} completed={} failed={} cancelled={}",
                stats.pending, stats.running, stats.completed, stats.failed, stats.cancelled
            );
            if tally != last_tally {
                self.job_manager.add_job_log(step_id, LogLevel::Info, format!("Waiting for children: {tally}"))?;
                last_tally = tally.clone();
            }

            if last_publish.elapsed() >= PROGRESS_PUBLISH_INTERVAL {
                self.job_manager.events().publish(Event::StepProgress {
                    step_id,
                    manager_id,
                    step_name: step_name.to_string(),
                    status: JobStatus::Running.to_string(),
                    pending_jobs: Some(stats.pending),
                    running_jobs: Some(stats.running),
                    completed_jobs: Some(stats.completed),
                    failed_jobs: Some(stats.failed),
                    timestamp_ms: self.clock.epoch_ms(),
                });
                last_publish = Instant::now();
            }

            if stats.pending + stats.running == 0 {
                self.job_manager.add_job_log(step_id, LogLevel::Info, format!("All children terminal: {tally}"))?;
                return Ok(());
            }

            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
