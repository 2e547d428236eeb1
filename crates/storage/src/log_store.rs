// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The log sink (`§4.3`): `AppendLog` persists an immutable record,
//! `GetLogs` returns the newest-first slice. Only `info` and above are
//! republished as events by the job manager; `debug` is persisted here but
//! never broadcast — that distinction is the job manager's, not the
//! store's, so this trait just stores what it's given.

use crate::error::StoreError;
use crate::ops::StorageOp;
use crate::store::Store;
use jobtree_core::{Clock, JobId, LogEntry};

pub trait LogStore {
    fn append_log(&self, job_id: JobId, entry: LogEntry) -> Result<(), StoreError>;

    /// Newest-first, capped at `limit`.
    fn get_logs(&self, job_id: JobId, limit: usize) -> Result<Vec<LogEntry>, StoreError>;
}

impl<C: Clock> LogStore for Store<C> {
    fn append_log(&self, job_id: JobId, entry: LogEntry) -> Result<(), StoreError> {
        self.commit(StorageOp::AppendLog { job_id, entry: Box::new(entry) })
    }

    fn get_logs(&self, job_id: JobId, limit: usize) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self.read(|s| {
            let mut entries = s.logs.get(&job_id).cloned().unwrap_or_default();
            entries.reverse();
            entries.truncate(limit);
            entries
        }))
    }
}

#[cfg(test)]
#[path = "log_store_tests.rs"]
mod tests;
