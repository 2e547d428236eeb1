// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed events published by the log/event sink. See `§3`, `§4.3`, `§6`.
//!
//! `§9`'s redesign note calls for tagged variants with a typed payload
//! record per event type in place of an untyped map payload; this enum is
//! that redesign. `Event::encode`/`Event::decode` give the string wire
//! format the note still requires at the edge.

use crate::job::JobId;
use crate::log::{LogLevel, Originator, Phase};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "JobCreated")]
    JobCreated {
        job_id: JobId,
        status: String,
        kind: String,
        timestamp_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<JobId>,
    },

    #[serde(rename = "JobStatusChange")]
    JobStatusChange {
        job_id: JobId,
        status: String,
        kind: String,
        timestamp_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<JobId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        document_count: Option<u64>,
    },

    #[serde(rename = "JobCompleted")]
    JobCompleted { job_id: JobId, timestamp_ms: u64 },

    #[serde(rename = "JobFailed")]
    JobFailed { job_id: JobId, error: String, timestamp_ms: u64 },

    #[serde(rename = "JobCancelled")]
    JobCancelled {
        job_id: JobId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<JobId>,
    },

    #[serde(rename = "JobProgress")]
    JobProgress {
        job_id: JobId,
        step_id: JobId,
        step_index: usize,
        step_name: String,
        step_type: String,
        current_step: usize,
        total_steps: usize,
        step_status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_child_count: Option<u64>,
        timestamp_ms: u64,
    },

    #[serde(rename = "JobLog")]
    JobLog {
        job_id: JobId,
        manager_id: JobId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_name: Option<String>,
        originator: Originator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase: Option<Phase>,
        level: LogLevel,
        message: String,
        timestamp_ms: u64,
    },

    #[serde(rename = "JobStats")]
    JobStats {
        total_jobs: u64,
        pending_jobs: u64,
        running_jobs: u64,
        completed_jobs: u64,
        failed_jobs: u64,
        cancelled_jobs: u64,
        timestamp_ms: u64,
    },

    #[serde(rename = "JobUpdate")]
    JobUpdate { job_id: JobId, timestamp_ms: u64 },

    #[serde(rename = "StepProgress")]
    StepProgress {
        step_id: JobId,
        manager_id: JobId,
        step_name: String,
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pending_jobs: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        running_jobs: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completed_jobs: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failed_jobs: Option<u64>,
        timestamp_ms: u64,
    },
}

impl Event {
    /// Event type tag, for logging and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JobCreated { .. } => "JobCreated",
            Self::JobStatusChange { .. } => "JobStatusChange",
            Self::JobCompleted { .. } => "JobCompleted",
            Self::JobFailed { .. } => "JobFailed",
            Self::JobCancelled { .. } => "JobCancelled",
            Self::JobProgress { .. } => "JobProgress",
            Self::JobLog { .. } => "JobLog",
            Self::JobStats { .. } => "JobStats",
            Self::JobUpdate { .. } => "JobUpdate",
            Self::StepProgress { .. } => "StepProgress",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
