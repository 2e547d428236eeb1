// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue message types. See `§3 DATA MODEL` and `§4.1 Persistent Queue`.

use crate::job::JobId;
use serde_json::Value;
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for a queue message, distinct from the job it dispatches.
    pub struct MessageId("msg-");
}

/// The body of a queue message: `{job_id, type}` only per the redesign
/// note in `§9` ("keep queue messages minimal ... avoids skew between
/// enqueued payload and post-enqueue metadata updates"). Handlers look up
/// the rest of the job's configuration from the store at execute time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
    /// Worker type this message routes to (`message.type` in `§4.8`).
    #[serde(rename = "type")]
    pub job_type: String,
}

impl JobMessage {
    pub fn new(job_id: JobId, job_type: impl Into<String>) -> Self {
        Self { job_id, job_type: job_type.into() }
    }

    /// Deterministic wire encoding (`§6`): JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// A message sitting in the persistent queue.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueMessage {
    pub id: MessageId,
    pub job_id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    pub payload: Vec<u8>,
    pub enqueued_at_ms: u64,
    pub visible_at_ms: u64,
    pub receive_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_id: Option<String>,
}

impl QueueMessage {
    pub fn is_visible(&self, now_ms: u64) -> bool {
        self.visible_at_ms <= now_ms
    }
}

/// Extra freeform fields some handlers attach to a leaf-job's config on
/// creation; kept as a typed convenience wrapper over the config map
/// rather than a second ad hoc map.
pub type ConfigMap = HashMap<String, Value>;

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
