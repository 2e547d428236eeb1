// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Worker` contract. Concrete workers (crawlers, agents, analyzers,
//! formatters) are external collaborators (`§1`); this module only
//! defines the capability set the step manager dispatches through
//! (`§9`'s "worker registry keyed by string type" redesign note: keep the
//! string key at the edge, make handlers polymorphic over a fixed trait).

use crate::cache::CacheTags;
use crate::error::CoreError;
use crate::job::JobId;
use crate::jobdef::{JobDefinition, StepDefinition};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Result of a worker's `Init` phase: how much work there is and how it
/// should be approached, without yet creating any leaf jobs (`§4.5`).
#[derive(Debug, Clone, Default)]
pub struct WorkerInitResult {
    pub work_items: Vec<Value>,
    pub total_count: u64,
    pub strategy: String,
    pub suggested_concurrency: u32,
    pub metadata: HashMap<String, Value>,
    pub content_hash: Option<String>,
}

/// Context passed to `Worker::init`.
pub struct WorkerInitContext<'a> {
    pub step: &'a StepDefinition,
    pub jobdef: &'a JobDefinition,
}

/// Context passed to `Worker::create_jobs`. `cache_tags` is attached by
/// the step manager immediately before invoking the worker (`§4.5` step 6)
/// so the worker can tag any document it writes back to the cache.
pub struct WorkerExecuteContext<'a> {
    pub step: &'a StepDefinition,
    pub jobdef: &'a JobDefinition,
    pub parent_job_id: JobId,
    pub init_result: &'a WorkerInitResult,
    pub cache_tags: CacheTags,
}

/// A typed handler for one leaf-job type.
///
/// Implementations are the external collaborators named in `§1`'s
/// out-of-scope list; only the contract lives here.
#[async_trait]
pub trait Worker: Send + Sync {
    /// The worker-type string used to route queue messages (`message.type`).
    fn get_type(&self) -> &str;

    /// Whether this worker's `create_jobs` enqueues leaf jobs that the
    /// dispatcher must wait for or hand to a monitor (`§4.7` step (g)).
    fn returns_child_jobs(&self) -> bool;

    /// Worker-supplied config validation (`§4.5`: "Validates config
    /// (worker-supplied) then calls the worker's Init").
    fn validate_config(&self, config: &HashMap<String, Value>) -> Result<(), CoreError>;

    async fn init(&self, ctx: &WorkerInitContext<'_>) -> Result<WorkerInitResult, CoreError>;

    /// Creates (and typically enqueues) child leaf jobs; returns the id of
    /// the job record standing in for this step's work (`§4.5`).
    async fn create_jobs(&self, ctx: &WorkerExecuteContext<'_>) -> Result<JobId, CoreError>;
}
