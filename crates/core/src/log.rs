// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job log entries and the hierarchy context attached to every one of them.
//! See `§3 DATA MODEL` and `§4.3 Log & Event Sink`.

use crate::job::JobId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

crate::simple_display! {
    LogLevel {
        Debug => "debug",
        Info => "info",
        Warn => "warn",
        Error => "error",
        Fatal => "fatal",
    }
}

impl LogLevel {
    /// Only `info` and above are republished as `JobLog` events (`§4.3`).
    pub fn is_broadcastable(self) -> bool {
        self >= LogLevel::Info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Originator {
    Manager,
    Step,
    Worker,
    System,
}

crate::simple_display! {
    Originator {
        Manager => "manager",
        Step => "step",
        Worker => "worker",
        System => "system",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Run,
    Orchestrator,
}

crate::simple_display! {
    Phase {
        Init => "init",
        Run => "run",
        Orchestrator => "orchestrator",
    }
}

/// `(job_id, manager_id, step_id, step_name, parent_id, originator)` resolved
/// for a node by `JobManager::resolve_job_hierarchy` (`§4.4`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyContext {
    pub job_id: JobId,
    pub manager_id: JobId,
    pub step_id: Option<JobId>,
    pub step_name: Option<String>,
    pub parent_id: Option<JobId>,
    pub originator: Originator,
}

/// `(timestamp, level, message, context)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub level: LogLevel,
    pub message: String,
    pub context: HierarchyContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
