// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Step Manager (`§4.5`): a registry of typed workers, plus the
//! pre-execution cache lookup and cleanup that sits in front of every
//! worker invocation.

use crate::cache_service::CacheService;
use crate::error::DispatchError;
use jobtree_core::{
    CacheConfig, CacheConfigPatch, CacheTags, CoreError, JobDefinition, JobId, StepDefinition,
    Worker, WorkerExecuteContext, WorkerInitContext, WorkerInitResult,
};
use jobtree_storage::DocumentStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Key used for the `cache` sub-object inside a jobdef/step's `config` map.
const CACHE_CONFIG_KEY: &str = "cache";

pub struct StepManager<D, C> {
    workers: HashMap<String, Arc<dyn Worker>>,
    cache: Option<CacheService<D, C>>,
}

impl<D, C> StepManager<D, C>
where
    D: DocumentStore,
    C: Clone,
{
    pub fn new() -> Self {
        Self { workers: HashMap::new(), cache: None }
    }

    pub fn with_cache_service(mut self, cache: CacheService<D, C>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Register a worker under its own type (`§4.5`).
    pub fn register_worker(&mut self, worker: Arc<dyn Worker>) {
        let ty = worker.get_type().to_string();
        self.workers.insert(ty, worker);
    }

    /// Register the same handler under an additional alias type, for
    /// deprecating a worker-type name without breaking in-flight
    /// definitions (`§4.5`).
    pub fn register_worker_alias(&mut self, worker: Arc<dyn Worker>, alias_type: impl Into<String>) {
        self.workers.insert(alias_type.into(), worker);
    }

    pub fn has_worker(&self, step_type: &str) -> bool {
        self.workers.contains_key(step_type)
    }

    pub fn get_worker(&self, step_type: &str) -> Option<&Arc<dyn Worker>> {
        self.workers.get(step_type)
    }

    /// Validates the step's config, then invokes the worker's Init phase
    /// (`§4.5`).
    pub async fn init(
        &self,
        step: &StepDefinition,
        jobdef: &JobDefinition,
    ) -> Result<WorkerInitResult, DispatchError> {
        let worker = self.worker_for(step)?;
        worker.validate_config(&step.config).map_err(DispatchError::Core)?;
        let ctx = WorkerInitContext { step, jobdef };
        Ok(worker.init(&ctx).await.map_err(DispatchError::Core)?)
    }

    /// The cache lookup / cleanup / invoke flow in `§4.5`'s "Cache flow
    /// inside `Execute`".
    pub async fn execute(
        &self,
        step: &StepDefinition,
        jobdef: &JobDefinition,
        parent_job_id: JobId,
        init_result: &WorkerInitResult,
    ) -> Result<ExecuteOutcome, DispatchError> {
        let worker = self.worker_for(step)?;
        let cache_config = self.resolve_cache_config(jobdef, step);
        let tags = CacheTags::new(jobdef.id.clone(), step.name.clone(), 1);
        let tags = match &init_result.content_hash {
            Some(hash) => tags.with_hash(hash.clone()),
            None => tags,
        };

        if cache_config.enabled && !matches!(cache_config.cache_type, jobtree_core::CacheType::None) {
            if let Some(cache) = &self.cache {
                if let Some(_doc) = cache.get_fresh_document(&tags, &cache_config).map_err(cache_err)? {
                    return Ok(ExecuteOutcome { child_job_id: parent_job_id, cache_hit: true });
                }
                if cache_config.revisions > 1 {
                    cache
                        .cleanup_revisions(&jobdef.id, &step.name, cache_config.revisions)
                        .map_err(cache_err)?;
                }
            }
        }

        let ctx =
            WorkerExecuteContext { step, jobdef, parent_job_id, init_result, cache_tags: tags };
        let child_job_id = worker.create_jobs(&ctx).await.map_err(DispatchError::Core)?;
        Ok(ExecuteOutcome { child_job_id, cache_hit: false })
    }

    fn worker_for(&self, step: &StepDefinition) -> Result<&Arc<dyn Worker>, DispatchError> {
        self.get_worker(&step.step_type).ok_or_else(|| DispatchError::UnknownWorkerType(step.step_type.clone()))
    }

    /// Merge jobdef-level and step-level `cache` config patches over the
    /// default (`enabled = false`), step-level winning (`§4.5` step 1).
    fn resolve_cache_config(&self, jobdef: &JobDefinition, step: &StepDefinition) -> CacheConfig {
        let base_patch = parse_cache_patch(jobdef.config.get(CACHE_CONFIG_KEY));
        let base = CacheConfig::merge(CacheConfig::default(), base_patch);
        let overlay_patch = parse_cache_patch(step.config.get(CACHE_CONFIG_KEY));
        CacheConfig::merge(base, overlay_patch)
    }
}

impl<D, C> Default for StepManager<D, C>
where
    D: DocumentStore,
    C: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

fn parse_cache_patch(value: Option<&serde_json::Value>) -> Option<CacheConfigPatch> {
    value.and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn cache_err(e: crate::error::CacheError) -> DispatchError {
    DispatchError::Core(CoreError::Transient(e.to_string()))
}

/// Result of `StepManager::execute`: the child job id standing in for
/// this step's work, and whether it came from a cache hit (`§4.5` step
/// 4: on hit, the worker is not invoked at all).
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOutcome {
    pub child_job_id: JobId,
    pub cache_hit: bool,
}

#[cfg(test)]
#[path = "step_manager_tests.rs"]
mod tests;
