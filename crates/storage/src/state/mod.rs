// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state built by replaying `StorageOp` records (`§4.1`,
//! `§4.2`). The WAL is the durable source of truth; this struct is the
//! derived, queryable view every store operation reads from.

mod jobs;
mod logs;
mod queue;

use crate::ops::StorageOp;
use jobtree_core::{JobId, JobNode, LogEntry, MessageId, QueueMessage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Ordering key for the queue's `visible_at` index (`§4.1`: "messages are
/// indexed by visible_at; iteration is ascending ... ties on visible_at are
/// broken by ID").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct VisibilityKey(pub u64, pub MessageId);

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub jobs: HashMap<JobId, JobNode>,
    /// `parent_id -> [child_id]`, materialized so `GetChildJobs` and the
    /// child-stats queries are single-round-trip (`§4.2`).
    #[serde(default)]
    pub(crate) children_index: HashMap<JobId, Vec<JobId>>,

    pub queue: HashMap<MessageId, QueueMessage>,
    #[serde(skip)]
    pub(crate) visibility_index: BTreeSet<VisibilityKey>,

    /// Append-only per-job log, newest entries pushed to the back.
    pub logs: HashMap<JobId, Vec<LogEntry>>,
}

impl MaterializedState {
    /// Rebuild the non-serialized indices after loading a snapshot or
    /// replaying the WAL from scratch.
    pub fn reindex(&mut self) {
        self.children_index.clear();
        for node in self.jobs.values() {
            if let Some(parent) = node.parent_id {
                self.children_index.entry(parent).or_default().push(node.id);
            }
        }
        self.visibility_index.clear();
        for msg in self.queue.values() {
            self.visibility_index.insert(VisibilityKey(msg.visible_at_ms, msg.id));
        }
    }

    pub fn apply(&mut self, op: &StorageOp) {
        match op {
            StorageOp::SaveJob { .. }
            | StorageOp::UpdateJobStatus { .. }
            | StorageOp::UpdateJobProgress { .. }
            | StorageOp::MergeJobMetadata { .. }
            | StorageOp::SetJobConfig { .. }
            | StorageOp::IncrementDocumentCount { .. }
            | StorageOp::SetJobFinished { .. }
            | StorageOp::MarkRunningAsPending { .. }
            | StorageOp::DeleteJob { .. } => jobs::apply(self, op),

            StorageOp::Enqueue { .. }
            | StorageOp::ReceiveMessage { .. }
            | StorageOp::DeleteMessage { .. }
            | StorageOp::ExtendVisibility { .. }
            | StorageOp::PurgeMessage { .. } => queue::apply(self, op),

            StorageOp::AppendLog { .. } => logs::apply(self, op),
        }
    }
}

#[cfg(test)]
#[path = "../state_tests.rs"]
mod tests;
