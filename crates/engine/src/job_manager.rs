// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job manager: a facade over the job store and log/event sink
//! (`§4.4`). Every status transition, log append, and cascade cancel in
//! the engine goes through here so the side effects in `§4.4` ("Status
//! change side effects", "Cascade cancel") happen exactly once per
//! mutation, regardless of which caller (dispatcher, worker pool, a
//! monitor) triggered it.

use crate::backend::Backend;
use crate::error::DispatchError;
use crate::event_bus::EventBus;
use crate::meta;
use jobtree_core::{
    Clock, Event, HierarchyContext, JobId, JobNode, JobStatus, LogEntry, LogLevel, NodeKind,
    Originator, Phase, Progress,
};
use jobtree_storage::{ChildStats, JobFilter, StepStats};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum interval between two `JobStats` publications, process-wide
/// (`§4.4`: "invoke throttled publishJobStats (at most once per 500ms)").
const STATS_THROTTLE: Duration = Duration::from_millis(500);

/// One entry of a manager's `metadata.step_stats` array (`§4.7` step (h)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepStatEntry {
    pub index: usize,
    pub id: JobId,
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub child_count: u64,
    pub document_count: u64,
    pub status: JobStatus,
}

/// `metadata.status_report`: accumulated non-fatal errors/warnings
/// surfaced to callers without failing the job outright (`§4.4`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

pub struct JobManager<S, C> {
    store: Arc<S>,
    events: EventBus,
    clock: C,
    last_stats_publish: Mutex<Option<Instant>>,
}

impl<S, C> Clone for JobManager<S, C>
where
    C: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            events: self.events.clone(),
            clock: self.clock.clone(),
            last_stats_publish: Mutex::new(*self.last_stats_publish.lock()),
        }
    }
}

impl<S, C> JobManager<S, C>
where
    S: Backend + 'static,
    C: Clock + 'static,
{
    pub fn new(store: Arc<S>, events: EventBus, clock: C) -> Self {
        Self { store, events, clock, last_stats_publish: Mutex::new(None) }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    // ---- Lifecycle -------------------------------------------------

    pub fn create_job_record(&self, node: JobNode) -> Result<(), DispatchError> {
        let job_id = node.id;
        let status = node.status;
        let kind = node.kind.as_str().to_string();
        let parent_id = node.parent_id;
        self.store.save_job(node)?;
        self.events.publish(Event::JobCreated {
            job_id,
            status: status.to_string(),
            kind,
            timestamp_ms: self.now_ms(),
            parent_id,
        });
        Ok(())
    }

    /// Creates a manager node (`type = manager`).
    pub fn create_manager_job(&self, id: JobId, name: impl Into<String>) -> Result<(), DispatchError> {
        self.create_job_record(JobNode::new_manager(id, name, self.now_ms()))
    }

    /// Creates any non-manager node under `parent_id`/`manager_id`.
    pub fn create_child_job(
        &self,
        id: JobId,
        parent_id: JobId,
        manager_id: JobId,
        kind: NodeKind,
        name: impl Into<String>,
    ) -> Result<(), DispatchError> {
        self.create_job_record(JobNode::new_child(id, parent_id, manager_id, kind, name, self.now_ms()))
    }

    /// Clone an existing node's config/metadata under a fresh id with
    /// `status = pending` (`§4.4`: `CopyJob`).
    pub fn copy_job(&self, source_id: JobId, new_id: JobId) -> Result<JobId, DispatchError> {
        let source = self.store.get_job(source_id)?;
        let mut copy = JobNode::new_child(
            new_id,
            source.parent_id.unwrap_or(new_id),
            source.manager_id,
            source.kind.clone(),
            source.name.clone(),
            self.now_ms(),
        );
        copy.config = source.config.clone();
        copy.metadata = source.metadata.clone();
        self.create_job_record(copy)?;
        Ok(new_id)
    }

    /// `UpdateJobStatus` plus every side effect in `§4.4`: a status-change
    /// log, a `JobStatusChange` event, the terminal-state lifecycle event,
    /// and a throttled stats publish.
    ///
    /// `JobCancelled` is deliberately not published here: it is the signal
    /// that tells an in-flight worker to abort (`subscribe_cancellation`),
    /// and only `stop_all_child_jobs` knows whether a given transition to
    /// `Cancelled` is that kind of cancellation, versus this call finalizing
    /// a job that was already told to stop. Publishing it unconditionally
    /// here would fire it twice for every formerly-running child.
    pub fn update_job_status(
        &self,
        id: JobId,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), DispatchError> {
        let now = self.now_ms();
        self.store.update_job_status(id, status, error.clone(), now)?;
        let node = self.store.get_job(id)?;

        self.add_job_log(id, LogLevel::Info, format!("Status changed: {status}"))?;
        self.events.publish(Event::JobStatusChange {
            job_id: id,
            status: status.to_string(),
            kind: node.kind.as_str().to_string(),
            timestamp_ms: now,
            parent_id: node.parent_id,
            document_count: Some(node.document_count()),
        });

        match status {
            JobStatus::Completed => self.events.publish(Event::JobCompleted { job_id: id, timestamp_ms: now }),
            JobStatus::Failed => self.events.publish(Event::JobFailed {
                job_id: id,
                error: error.unwrap_or_default(),
                timestamp_ms: now,
            }),
            _ => {}
        }

        self.publish_job_stats_throttled()?;
        Ok(())
    }

    pub fn set_job_error(&self, id: JobId, error: impl Into<String>) -> Result<(), DispatchError> {
        self.update_job_status(id, JobStatus::Failed, Some(error.into()))
    }

    pub fn set_job_finished(&self, id: JobId) -> Result<(), DispatchError> {
        self.store.set_job_finished(id, self.now_ms())?;
        Ok(())
    }

    pub fn delete_job(&self, id: JobId) -> Result<(), DispatchError> {
        self.store.delete_job(id)?;
        Ok(())
    }

    // ---- Metadata ----------------------------------------------------

    pub fn update_job_metadata(&self, id: JobId, patch: HashMap<String, Value>) -> Result<(), DispatchError> {
        self.store.merge_job_metadata(id, patch)?;
        Ok(())
    }

    pub fn update_job_config(&self, id: JobId, config: HashMap<String, Value>) -> Result<(), DispatchError> {
        self.store.set_job_config(id, config)?;
        Ok(())
    }

    /// Locate `step_stats[i]` by step id inside the manager's metadata and
    /// overwrite the whole entry; also refresh `current_step_status` if
    /// `step_id` is the manager's current step (`§4.4`).
    pub fn update_step_stat_in_manager(&self, manager_id: JobId, entry: StepStatEntry) -> Result<(), DispatchError> {
        let manager = self.store.get_job(manager_id)?;
        let mut stats = read_step_stats(&manager);
        match stats.iter_mut().find(|s| s.id == entry.id) {
            Some(existing) => *existing = entry.clone(),
            None => stats.push(entry.clone()),
        }

        let mut patch = HashMap::new();
        patch.insert(meta::STEP_STATS.to_string(), serde_json::to_value(&stats).unwrap_or(Value::Null));
        if manager.meta_str(meta::CURRENT_STEP_ID) == Some(entry.id.as_ref()) {
            patch.insert(meta::CURRENT_STEP_STATUS.to_string(), Value::String(entry.status.to_string()));
        }
        self.update_job_metadata(manager_id, patch)
    }

    pub fn add_job_error(&self, manager_id: JobId, message: impl Into<String>) -> Result<(), DispatchError> {
        self.append_status_report(manager_id, message.into(), true)
    }

    pub fn add_job_warning(&self, manager_id: JobId, message: impl Into<String>) -> Result<(), DispatchError> {
        self.append_status_report(manager_id, message.into(), false)
    }

    fn append_status_report(&self, manager_id: JobId, message: String, is_error: bool) -> Result<(), DispatchError> {
        let manager = self.store.get_job(manager_id)?;
        let mut report: StatusReport = manager
            .metadata
            .get(meta::STATUS_REPORT)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        if is_error {
            report.errors.push(message);
        } else {
            report.warnings.push(message);
        }
        let mut patch = HashMap::new();
        patch.insert(meta::STATUS_REPORT.to_string(), serde_json::to_value(&report).unwrap_or(Value::Null));
        self.update_job_metadata(manager_id, patch)
    }

    // ---- Hierarchy resolution -----------------------------------------

    /// `(step_name, manager_id, step_id, parent_id, originator)` (`§4.4`).
    pub fn resolve_job_hierarchy(&self, id: JobId) -> Result<HierarchyContext, DispatchError> {
        let node = self.store.get_job(id)?;
        let originator = match node.kind {
            NodeKind::Manager => Originator::Manager,
            NodeKind::Step => Originator::Step,
            NodeKind::Worker(_) => Originator::Worker,
        };

        let manager_id = match node.kind {
            NodeKind::Manager => node.id,
            _ => node
                .meta_str(meta::MANAGER_ID)
                .map(JobId::from)
                .unwrap_or_else(|| self.climb_to_manager(&node)),
        };

        let step_id = match node.kind {
            NodeKind::Manager => None,
            NodeKind::Step => Some(node.id),
            NodeKind::Worker(_) => node
                .meta_str(meta::STEP_ID)
                .map(JobId::from)
                .or_else(|| node.parent_id.filter(|p| self.is_step(*p))),
        };

        let step_name = step_id.and_then(|id| self.store.get_job(id).ok()).map(|step| step.name);

        Ok(HierarchyContext {
            job_id: id,
            manager_id,
            step_id,
            step_name,
            parent_id: node.parent_id,
            originator,
        })
    }

    fn is_step(&self, id: JobId) -> bool {
        self.store.get_job(id).map(|n| n.is_step()).unwrap_or(false)
    }

    fn climb_to_manager(&self, node: &JobNode) -> JobId {
        let mut current = node.clone();
        while let Some(parent_id) = current.parent_id {
            match self.store.get_job(parent_id) {
                Ok(parent) if parent.is_manager() => return parent.id,
                Ok(parent) => current = parent,
                Err(_) => break,
            }
        }
        node.manager_id
    }

    // ---- Logging --------------------------------------------------------

    pub fn add_job_log(&self, id: JobId, level: LogLevel, message: impl Into<String>) -> Result<(), DispatchError> {
        self.add_job_log_full(id, level, message, None)
    }

    pub fn add_job_log_with_phase(
        &self,
        id: JobId,
        level: LogLevel,
        message: impl Into<String>,
        phase: Phase,
    ) -> Result<(), DispatchError> {
        self.add_job_log_full(id, level, message, Some(phase))
    }

    pub fn add_job_log_full(
        &self,
        id: JobId,
        level: LogLevel,
        message: impl Into<String>,
        phase: Option<Phase>,
    ) -> Result<(), DispatchError> {
        let message = message.into();
        let context = self.resolve_job_hierarchy(id)?;
        let entry = LogEntry { timestamp_ms: self.now_ms(), level, message: message.clone(), context, phase };
        self.store.append_log(id, entry.clone())?;

        match level {
            LogLevel::Debug => tracing::debug!(job_id = %id, "{message}"),
            LogLevel::Info => tracing::info!(job_id = %id, "{message}"),
            LogLevel::Warn => tracing::warn!(job_id = %id, "{message}"),
            LogLevel::Error | LogLevel::Fatal => tracing::error!(job_id = %id, "{message}"),
        }

        if level.is_broadcastable() {
            self.events.publish(Event::JobLog {
                job_id: id,
                manager_id: entry.context.manager_id,
                step_name: entry.context.step_name.clone(),
                originator: entry.context.originator,
                phase: entry.phase,
                level,
                message: entry.message,
                timestamp_ms: entry.timestamp_ms,
            });
        }
        Ok(())
    }

    // ---- Cascade cancel --------------------------------------------------

    /// Recursively cancel every non-terminal descendant of `parent_id`,
    /// publishing `JobCancelled` for each formerly-running one so an
    /// in-flight worker can observe and abort (`§4.4`, P6, P10). This is
    /// the sole `JobCancelled` publisher: `update_job_status` does not
    /// publish it, so each formerly-running child is announced exactly
    /// once, even though the worker that picks up the cancellation later
    /// calls `update_job_status` again to finalize its own status.
    pub fn stop_all_child_jobs(&self, parent_id: JobId) -> Result<(), DispatchError> {
        let mut stack: Vec<JobId> = self.store.get_child_jobs(parent_id)?.into_iter().map(|n| n.id).collect();
        while let Some(id) = stack.pop() {
            let node = self.store.get_job(id)?;
            stack.extend(self.store.get_child_jobs(id)?.into_iter().map(|n| n.id));
            if node.status.is_terminal() {
                continue;
            }
            let was_running = node.status == JobStatus::Running;
            self.update_job_status(id, JobStatus::Cancelled, None)?;
            if was_running {
                self.events.publish(Event::JobCancelled { job_id: id, parent_id: node.parent_id });
            }
        }
        Ok(())
    }

    // ---- Counts ------------------------------------------------------

    pub fn get_failed_child_count(&self, manager_id: JobId) -> Result<u32, DispatchError> {
        let manager = self.store.get_job(manager_id)?;
        Ok(manager.metadata.get(meta::ERROR_TOLERANCE_FAILURES).and_then(Value::as_u64).unwrap_or(0) as u32)
    }

    /// `failed_child_count` is never reset between steps (`§9` Open
    /// Question, resolved in DESIGN.md: lives in manager metadata and
    /// accumulates for the lifetime of the manager).
    pub fn increment_failed_child_count(&self, manager_id: JobId) -> Result<u32, DispatchError> {
        let next = self.get_failed_child_count(manager_id)? + 1;
        let mut patch = HashMap::new();
        patch.insert(meta::ERROR_TOLERANCE_FAILURES.to_string(), Value::from(next));
        self.update_job_metadata(manager_id, patch)?;
        Ok(next)
    }

    pub fn get_document_count(&self, id: JobId) -> Result<u64, DispatchError> {
        Ok(self.store.get_job(id)?.document_count())
    }

    pub fn increment_document_count(&self, id: JobId) -> Result<u64, DispatchError> {
        Ok(self.store.increment_document_count(id)?)
    }

    pub fn get_step_stats(&self, manager_id: JobId) -> Result<StepStats, DispatchError> {
        Ok(self.store.get_step_stats(manager_id)?)
    }

    pub fn get_job_child_stats(&self, parent_ids: &[JobId]) -> Result<HashMap<JobId, ChildStats>, DispatchError> {
        Ok(self.store.get_job_child_stats(parent_ids)?)
    }

    pub fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobNode>, DispatchError> {
        Ok(self.store.list_jobs(filter)?)
    }

    // ---- Stats publication --------------------------------------------

    fn publish_job_stats_throttled(&self) -> Result<(), DispatchError> {
        let now = self.clock.now();
        {
            let mut gate = self.last_stats_publish.lock();
            if let Some(last) = *gate {
                if now.saturating_duration_since(last) < STATS_THROTTLE {
                    return Ok(());
                }
            }
            *gate = Some(now);
        }

        let total = self.store.count_jobs()?;
        let pending = self.store.count_jobs_by_status(JobStatus::Pending)?;
        let running = self.store.count_jobs_by_status(JobStatus::Running)?;
        let completed = self.store.count_jobs_by_status(JobStatus::Completed)?;
        let failed = self.store.count_jobs_by_status(JobStatus::Failed)?;
        let cancelled = self.store.count_jobs_by_status(JobStatus::Cancelled)?;
        self.events.publish(Event::JobStats {
            total_jobs: total,
            pending_jobs: pending,
            running_jobs: running,
            completed_jobs: completed,
            failed_jobs: failed,
            cancelled_jobs: cancelled,
            timestamp_ms: self.now_ms(),
        });
        Ok(())
    }
}

pub fn read_step_stats(node: &JobNode) -> Vec<StepStatEntry> {
    node.metadata
        .get(meta::STEP_STATS)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "job_manager_tests.rs"]
mod tests;
