// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job-node mutation handlers (`§4.2`).

use super::MaterializedState;
use crate::ops::StorageOp;

pub(super) fn apply(state: &mut MaterializedState, op: &StorageOp) {
    match op {
        StorageOp::SaveJob { job } => {
            if let Some(parent) = job.parent_id {
                let siblings = state.children_index.entry(parent).or_default();
                if !siblings.contains(&job.id) {
                    siblings.push(job.id);
                }
            }
            state.jobs.insert(job.id, (**job).clone());
        }

        StorageOp::UpdateJobStatus { id, status, error, now_ms } => {
            if let Some(node) = state.jobs.get_mut(id) {
                if node.status.is_terminal() {
                    return;
                }
                node.status = *status;
                if node.started_at_ms.is_none() && matches!(status, jobtree_core::JobStatus::Running) {
                    node.started_at_ms = Some(*now_ms);
                }
                if status.is_terminal() {
                    node.completed_at_ms = Some(*now_ms);
                }
                node.error = error.clone();
            }
        }

        StorageOp::UpdateJobProgress { id, progress } => {
            if let Some(node) = state.jobs.get_mut(id) {
                node.progress = *progress;
            }
        }

        StorageOp::MergeJobMetadata { id, patch } => {
            if let Some(node) = state.jobs.get_mut(id) {
                node.merge_metadata(patch.clone());
            }
        }

        StorageOp::SetJobConfig { id, config } => {
            if let Some(node) = state.jobs.get_mut(id) {
                node.config = config.clone();
            }
        }

        StorageOp::IncrementDocumentCount { id } => {
            if let Some(node) = state.jobs.get_mut(id) {
                node.increment_document_count();
            }
        }

        StorageOp::SetJobFinished { id, now_ms } => {
            if let Some(node) = state.jobs.get_mut(id) {
                node.finished_at_ms = Some(*now_ms);
            }
        }

        StorageOp::MarkRunningAsPending { .. } => {
            for node in state.jobs.values_mut() {
                if node.status == jobtree_core::JobStatus::Running {
                    node.status = jobtree_core::JobStatus::Pending;
                    node.started_at_ms = None;
                }
            }
        }

        StorageOp::DeleteJob { id } => {
            let mut stack = vec![*id];
            let parent = state.jobs.get(id).and_then(|n| n.parent_id);
            let mut to_remove = Vec::new();
            while let Some(current) = stack.pop() {
                to_remove.push(current);
                if let Some(children) = state.children_index.remove(&current) {
                    stack.extend(children);
                }
            }
            for node_id in &to_remove {
                state.jobs.remove(node_id);
                state.logs.remove(node_id);
            }
            if let Some(parent) = parent {
                if let Some(siblings) = state.children_index.get_mut(&parent) {
                    siblings.retain(|c| c != id);
                }
            }
        }

        _ => {}
    }
}
