// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job node: the single record type shared by managers, steps, and
//! leaf (worker) jobs. See `§3 DATA MODEL`.

use crate::status::{JobStatus, NodeKind};
use serde_json::Value;
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for any node in the job tree (manager, step, or leaf).
    pub struct JobId("job-");
}

/// `(current, total)` progress counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
}

impl Progress {
    pub fn new(current: u64, total: u64) -> Self {
        Self { current, total }
    }
}

/// A single node in the manager → step → leaf hierarchy.
///
/// Every field in `§3`'s job-node table is represented; `metadata` and
/// `config` stay as string-keyed JSON maps (per the "keep one narrow
/// extra field" guidance in `§9`) but the well-known metadata keys used
/// by the dispatcher and job manager have typed accessors below rather
/// than being re-parsed ad hoc at every call site.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JobNode {
    pub id: JobId,
    pub parent_id: Option<JobId>,
    pub manager_id: JobId,
    pub kind: NodeKind,
    pub name: String,
    pub status: JobStatus,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    /// Set only once this node and all descendants have reached a terminal state.
    pub finished_at_ms: Option<u64>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub progress: Progress,
    pub error: Option<String>,
}

impl JobNode {
    pub fn new_manager(id: JobId, name: impl Into<String>, created_at_ms: u64) -> Self {
        Self {
            id,
            parent_id: None,
            manager_id: id,
            kind: NodeKind::Manager,
            name: name.into(),
            status: JobStatus::Pending,
            created_at_ms,
            started_at_ms: None,
            completed_at_ms: None,
            finished_at_ms: None,
            config: HashMap::new(),
            metadata: HashMap::new(),
            progress: Progress::default(),
            error: None,
        }
    }

    pub fn new_child(
        id: JobId,
        parent_id: JobId,
        manager_id: JobId,
        kind: NodeKind,
        name: impl Into<String>,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id,
            parent_id: Some(parent_id),
            manager_id,
            kind,
            name: name.into(),
            status: JobStatus::Pending,
            created_at_ms,
            started_at_ms: None,
            completed_at_ms: None,
            finished_at_ms: None,
            config: HashMap::new(),
            metadata: HashMap::new(),
            progress: Progress::default(),
            error: None,
        }
    }

    pub fn is_manager(&self) -> bool {
        matches!(self.kind, NodeKind::Manager)
    }

    pub fn is_step(&self) -> bool {
        matches!(self.kind, NodeKind::Step)
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Shallow-merge `patch` into `metadata` (per `UpdateJobMetadata`'s merge semantics).
    pub fn merge_metadata(&mut self, patch: HashMap<String, Value>) {
        for (k, v) in patch {
            self.metadata.insert(k, v);
        }
    }

    /// Document count is tracked as a single metadata counter, mutated only
    /// through `JobNode::increment_document_count` so the monotonicity
    /// invariant (P3) holds even when several call sites touch metadata.
    pub fn document_count(&self) -> u64 {
        self.metadata.get("document_count").and_then(Value::as_u64).unwrap_or(0)
    }

    pub fn increment_document_count(&mut self) -> u64 {
        let next = self.document_count() + 1;
        self.set_meta("document_count", next);
        next
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct JobNodeBuilder {
    id: JobId,
    parent_id: Option<JobId>,
    manager_id: JobId,
    kind: NodeKind,
    name: String,
    status: JobStatus,
    created_at_ms: u64,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for JobNodeBuilder {
    fn default() -> Self {
        let id = JobId::new();
        Self {
            id,
            parent_id: None,
            manager_id: id,
            kind: NodeKind::Manager,
            name: "test-job".to_string(),
            status: JobStatus::Pending,
            created_at_ms: 0,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl JobNodeBuilder {
    pub fn id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn parent_id(mut self, id: JobId) -> Self {
        self.parent_id = Some(id);
        self
    }

    pub fn manager_id(mut self, id: JobId) -> Self {
        self.manager_id = id;
        self
    }

    pub fn kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn created_at_ms(mut self, ms: u64) -> Self {
        self.created_at_ms = ms;
        self
    }

    pub fn build(self) -> JobNode {
        let mut node = JobNode::new_child(
            self.id,
            self.parent_id.unwrap_or(self.id),
            self.manager_id,
            self.kind,
            self.name,
            self.created_at_ms,
        );
        node.status = self.status;
        if self.parent_id.is_none() {
            node.parent_id = None;
        }
        node
    }
}

#[cfg(any(test, feature = "test-support"))]
impl JobNode {
    pub fn builder() -> JobNodeBuilder {
        JobNodeBuilder::default()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
