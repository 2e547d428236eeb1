// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The WAL's record type: one variant per durable mutation the job store,
//! queue, and log sink perform (`§4.1`, `§4.2`, `§4.3`). Kept separate from
//! `jobtree_core::Event` (the pub/sub notification the job manager
//! broadcasts) — a single `UpdateJobStatus` call here can fan out into
//! several `Event`s (`JobStatusChange` plus a terminal-status event) but is
//! exactly one durable fact.

use jobtree_core::{JobId, JobNode, LogEntry, MessageId, Progress, QueueMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum StorageOp {
    SaveJob { job: Box<JobNode> },
    UpdateJobStatus { id: JobId, status: jobtree_core::JobStatus, error: Option<String>, now_ms: u64 },
    UpdateJobProgress { id: JobId, progress: Progress },
    MergeJobMetadata { id: JobId, patch: HashMap<String, Value> },
    SetJobConfig { id: JobId, config: HashMap<String, Value> },
    IncrementDocumentCount { id: JobId },
    SetJobFinished { id: JobId, now_ms: u64 },
    MarkRunningAsPending { reason: String, now_ms: u64 },
    DeleteJob { id: JobId },

    Enqueue { message: QueueMessage },
    ReceiveMessage { id: MessageId, visible_at_ms: u64, receive_count: u32 },
    DeleteMessage { id: MessageId },
    ExtendVisibility { id: MessageId, visible_at_ms: u64 },
    PurgeMessage { id: MessageId },

    AppendLog { job_id: JobId, entry: Box<LogEntry> },
}
