// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `StepMonitor` and `JobMonitor` — external collaborators that watch
//! spawned children and finalize step/manager status when they terminate
//! asynchronously (`§1` item 9, `§4.7` step (h)/(j)).
//!
//! The dispatcher hands off to these when a monitor is supplied; otherwise
//! it falls back to the inline wait loop (`§5`) it implements itself.

use crate::error::CoreError;
use crate::job::JobId;
use async_trait::async_trait;

#[async_trait]
pub trait StepMonitor: Send + Sync {
    /// Begin watching `step_id`'s children; finalize the step to
    /// `Completed`/`Failed` once all of them reach a terminal state.
    async fn start_monitoring(&self, step_id: JobId) -> Result<(), CoreError>;
}

#[async_trait]
pub trait JobMonitor: Send + Sync {
    /// Begin watching `manager_id`'s steps; finalize the manager once all
    /// steps reach a terminal state.
    async fn start_monitoring(&self, manager_id: JobId) -> Result<(), CoreError>;
}
