// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job definition (dispatcher input). See `§6 EXTERNAL INTERFACES`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    Continue,
    Fail,
    Fatal,
}

impl Default for OnError {
    fn default() -> Self {
        Self::Fail
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    StopAll,
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorTolerance {
    #[serde(default)]
    pub max_child_failures: u32,
    #[serde(default = "default_failure_action")]
    pub failure_action: FailureAction,
}

fn default_failure_action() -> FailureAction {
    FailureAction::Continue
}

impl Default for ErrorTolerance {
    fn default() -> Self {
        Self { max_child_failures: u32::MAX, failure_action: FailureAction::Continue }
    }
}

/// One element of a job definition's `steps[]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Comma-separated list of prior step names this step depends on.
    #[serde(default)]
    pub depends: Option<String>,
    #[serde(default)]
    pub always_run: bool,
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

impl StepDefinition {
    /// Parse `depends = "s1, s2"` into a trimmed, non-empty list of step names.
    pub fn depends_on(&self) -> Vec<&str> {
        self.depends
            .as_deref()
            .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// The dispatcher's input: an ordered list of typed steps plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    /// Seconds. Defaults to 30 minutes per `§5`'s wait-loop timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub auth_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default)]
    pub error_tolerance: Option<ErrorTolerance>,
    pub steps: Vec<StepDefinition>,
}

fn default_timeout_secs() -> u64 {
    30 * 60
}

fn default_true() -> bool {
    true
}

impl JobDefinition {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }

    pub fn error_tolerance(&self) -> ErrorTolerance {
        self.error_tolerance.clone().unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "jobdef_tests.rs"]
mod tests;
