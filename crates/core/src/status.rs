// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical job-node status axis.
//!
//! Status is monotone along `{Pending, Running} -> {Completed, Failed,
//! Cancelled, Skipped}`; once terminal it never moves again (P1). The
//! dispatcher's internal "spawned" notion (a step that has children still
//! running) is never persisted here — it stays `Running` until a monitor
//! or the inline wait loop finalizes it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Skipped,
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
        Skipped => "skipped",
    }
}

impl JobStatus {
    /// True once the node can no longer change status (P1).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled | Self::Skipped)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Terminal statuses are sinks. Pending and Running may move to any
    /// other status (including each other); this matches the source's
    /// "status is monotone" invariant without over-constraining which
    /// terminal status a node ends in.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        true
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Node type on the three-level job tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Manager,
    Step,
    /// A leaf job, tagged with the worker type that executes it.
    Worker(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Manager => "manager",
            Self::Step => "step",
            Self::Worker(ty) => ty.as_str(),
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
