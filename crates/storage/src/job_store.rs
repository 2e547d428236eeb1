// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job store contract (`§4.2`): point writes to `JobNode`s plus the
//! aggregate/list queries the job manager and dispatcher need. Status
//! transitions performed here are point writes — the job manager enforces
//! higher-level rules (logging, event publication, cascade cancel) on top.

use crate::error::StoreError;
use crate::ops::StorageOp;
use crate::store::Store;
use jobtree_core::{Clock, JobId, JobNode, JobStatus, Progress};
use serde_json::Value;
use std::collections::HashMap;

/// Sentinel `parent_id` for `ListJobs` meaning "top-level, no parent" (`§4.2`).
pub const ROOT_PARENT: &str = "root";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    CreatedAt,
    Name,
}

/// `ListJobs` filter set (`§4.2`). `parent_id = Some(ROOT_PARENT)` matches
/// nodes with no parent; any other `Some(id)` matches direct children of
/// that id; `None` matches every job regardless of parent.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub parent_id: Option<String>,
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub order_by: Option<OrderBy>,
    pub order_dir: OrderDir,
}

impl Default for OrderDir {
    fn default() -> Self {
        Self::Asc
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildStats {
    pub child_count: u64,
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    pub total_steps: u64,
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
}

pub trait JobStore {
    fn save_job(&self, job: JobNode) -> Result<(), StoreError>;
    fn get_job(&self, id: JobId) -> Result<JobNode, StoreError>;
    fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobNode>, StoreError>;
    fn get_child_jobs(&self, parent_id: JobId) -> Result<Vec<JobNode>, StoreError>;
    fn get_job_child_stats(&self, parent_ids: &[JobId]) -> Result<HashMap<JobId, ChildStats>, StoreError>;
    fn get_step_stats(&self, manager_id: JobId) -> Result<StepStats, StoreError>;

    fn update_job_status(
        &self,
        id: JobId,
        status: JobStatus,
        error: Option<String>,
        now_ms: u64,
    ) -> Result<(), StoreError>;
    fn update_job_progress(&self, id: JobId, progress: Progress) -> Result<(), StoreError>;
    fn merge_job_metadata(&self, id: JobId, patch: HashMap<String, Value>) -> Result<(), StoreError>;
    fn set_job_config(&self, id: JobId, config: HashMap<String, Value>) -> Result<(), StoreError>;
    fn set_job_finished(&self, id: JobId, now_ms: u64) -> Result<(), StoreError>;

    /// Safe under contention: implementations must serialize the
    /// read-increment-write cycle (`§4.2`).
    fn increment_document_count(&self, id: JobId) -> Result<u64, StoreError>;

    fn mark_running_jobs_as_pending(&self, reason: &str, now_ms: u64) -> Result<u64, StoreError>;

    fn count_jobs(&self) -> Result<u64, StoreError>;
    fn count_jobs_by_status(&self, status: JobStatus) -> Result<u64, StoreError>;
    fn count_jobs_with_filters(&self, filter: &JobFilter) -> Result<u64, StoreError>;

    /// Cascades to every descendant (`§4.2`).
    fn delete_job(&self, id: JobId) -> Result<(), StoreError>;
}

fn matches_filter(node: &JobNode, filter: &JobFilter) -> bool {
    if let Some(parent) = &filter.parent_id {
        let matches_parent = if parent == ROOT_PARENT {
            node.parent_id.is_none()
        } else {
            node.parent_id.as_deref() == Some(parent.as_str())
        };
        if !matches_parent {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if node.status != status {
            return false;
        }
    }
    if let Some(ty) = &filter.job_type {
        if node.kind.as_str() != ty {
            return false;
        }
    }
    true
}

fn apply_order_and_page(mut nodes: Vec<JobNode>, filter: &JobFilter) -> Vec<JobNode> {
    match filter.order_by {
        Some(OrderBy::CreatedAt) => nodes.sort_by_key(|n| n.created_at_ms),
        Some(OrderBy::Name) => nodes.sort_by(|a, b| a.name.cmp(&b.name)),
        None => {}
    }
    if filter.order_dir == OrderDir::Desc {
        nodes.reverse();
    }
    if filter.offset > 0 {
        nodes = nodes.into_iter().skip(filter.offset).collect();
    }
    if let Some(limit) = filter.limit {
        nodes.truncate(limit);
    }
    nodes
}

impl<C: Clock> JobStore for Store<C> {
    fn save_job(&self, job: JobNode) -> Result<(), StoreError> {
        self.commit(StorageOp::SaveJob { job: Box::new(job) })
    }

    fn get_job(&self, id: JobId) -> Result<JobNode, StoreError> {
        self.read(|s| s.jobs.get(&id).cloned()).ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobNode>, StoreError> {
        let matching: Vec<JobNode> =
            self.read(|s| s.jobs.values().filter(|n| matches_filter(n, filter)).cloned().collect());
        Ok(apply_order_and_page(matching, filter))
    }

    fn get_child_jobs(&self, parent_id: JobId) -> Result<Vec<JobNode>, StoreError> {
        Ok(self.read(|s| {
            s.children_index
                .get(&parent_id)
                .map(|ids| ids.iter().filter_map(|id| s.jobs.get(id).cloned()).collect())
                .unwrap_or_default()
        }))
    }

    fn get_job_child_stats(&self, parent_ids: &[JobId]) -> Result<HashMap<JobId, ChildStats>, StoreError> {
        Ok(self.read(|s| {
            parent_ids
                .iter()
                .map(|parent| {
                    let mut stats = ChildStats::default();
                    if let Some(children) = s.children_index.get(parent) {
                        for child_id in children {
                            let Some(child) = s.jobs.get(child_id) else { continue };
                            stats.child_count += 1;
                            match child.status {
                                JobStatus::Pending => stats.pending += 1,
                                JobStatus::Running => stats.running += 1,
                                JobStatus::Completed => stats.completed += 1,
                                JobStatus::Failed => stats.failed += 1,
                                JobStatus::Cancelled => stats.cancelled += 1,
                                JobStatus::Skipped => {}
                            }
                        }
                    }
                    (*parent, stats)
                })
                .collect()
        }))
    }

    fn get_step_stats(&self, manager_id: JobId) -> Result<StepStats, StoreError> {
        Ok(self.read(|s| {
            let mut stats = StepStats::default();
            let Some(step_ids) = s.children_index.get(&manager_id) else { return stats };
            for step_id in step_ids {
                let Some(step) = s.jobs.get(step_id) else { continue };
                if !step.is_step() {
                    continue;
                }
                stats.total_steps += 1;
                match step.status {
                    JobStatus::Pending => stats.pending += 1,
                    JobStatus::Running => stats.running += 1,
                    JobStatus::Completed => stats.completed += 1,
                    JobStatus::Failed => stats.failed += 1,
                    JobStatus::Cancelled => stats.cancelled += 1,
                    JobStatus::Skipped => {}
                }
                if let Some(leaf_ids) = s.children_index.get(step_id) {
                    for leaf_id in leaf_ids {
                        let Some(leaf) = s.jobs.get(leaf_id) else { continue };
                        stats.total_jobs += 1;
                        match leaf.status {
                            JobStatus::Completed => stats.completed_jobs += 1,
                            JobStatus::Failed => stats.failed_jobs += 1,
                            _ => {}
                        }
                    }
                }
            }
            stats
        }))
    }

    fn update_job_status(
        &self,
        id: JobId,
        status: JobStatus,
        error: Option<String>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        self.commit(StorageOp::UpdateJobStatus { id, status, error, now_ms })
    }

    fn update_job_progress(&self, id: JobId, progress: Progress) -> Result<(), StoreError> {
        self.commit(StorageOp::UpdateJobProgress { id, progress })
    }

    fn merge_job_metadata(&self, id: JobId, patch: HashMap<String, Value>) -> Result<(), StoreError> {
        self.commit(StorageOp::MergeJobMetadata { id, patch })
    }

    fn set_job_config(&self, id: JobId, config: HashMap<String, Value>) -> Result<(), StoreError> {
        self.commit(StorageOp::SetJobConfig { id, config })
    }

    fn set_job_finished(&self, id: JobId, now_ms: u64) -> Result<(), StoreError> {
        self.commit(StorageOp::SetJobFinished { id, now_ms })
    }

    fn increment_document_count(&self, id: JobId) -> Result<u64, StoreError> {
        self.commit(StorageOp::IncrementDocumentCount { id })?;
        self.read(|s| s.jobs.get(&id).map(|n| n.document_count()))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn mark_running_jobs_as_pending(&self, reason: &str, now_ms: u64) -> Result<u64, StoreError> {
        let count = self.read(|s| s.jobs.values().filter(|n| n.status == JobStatus::Running).count()) as u64;
        self.commit(StorageOp::MarkRunningAsPending { reason: reason.to_string(), now_ms })?;
        Ok(count)
    }

    fn count_jobs(&self) -> Result<u64, StoreError> {
        Ok(self.read(|s| s.jobs.len() as u64))
    }

    fn count_jobs_by_status(&self, status: JobStatus) -> Result<u64, StoreError> {
        Ok(self.read(|s| s.jobs.values().filter(|n| n.status == status).count() as u64))
    }

    fn count_jobs_with_filters(&self, filter: &JobFilter) -> Result<u64, StoreError> {
        Ok(self.read(|s| s.jobs.values().filter(|n| matches_filter(n, filter)).count() as u64))
    }

    fn delete_job(&self, id: JobId) -> Result<(), StoreError> {
        self.commit(StorageOp::DeleteJob { id })
    }
}

#[cfg(test)]
#[path = "job_store_tests.rs"]
mod tests;
