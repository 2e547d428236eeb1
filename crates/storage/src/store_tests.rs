// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use jobtree_core::{FakeClock, JobId, JobNode};
use tempfile::tempdir;

#[test]
fn in_memory_store_applies_without_wal() {
    let store = Store::in_memory(FakeClock::new());
    let id = JobId::new();
    store.commit(StorageOp::SaveJob { job: Box::new(JobNode::new_manager(id, "mgr", 0)) }).unwrap();
    assert!(store.read(|s| s.jobs.contains_key(&id)));
}

#[test]
fn durable_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let id = JobId::new();
    {
        let store = Store::open(dir.path(), FakeClock::new()).unwrap();
        store.commit(StorageOp::SaveJob { job: Box::new(JobNode::new_manager(id, "mgr", 0)) }).unwrap();
        store.checkpoint().unwrap();
    }
    let reopened = Store::open(dir.path(), FakeClock::new()).unwrap();
    assert!(reopened.read(|s| s.jobs.contains_key(&id)));
}

#[test]
fn durable_store_replays_wal_without_checkpoint() {
    let dir = tempdir().unwrap();
    let id = JobId::new();
    {
        let store = Store::open(dir.path(), FakeClock::new()).unwrap();
        store.commit(StorageOp::SaveJob { job: Box::new(JobNode::new_manager(id, "mgr", 0)) }).unwrap();
        store.commit(StorageOp::UpdateJobStatus {
            id,
            status: jobtree_core::JobStatus::Running,
            error: None,
            now_ms: 5,
        }).unwrap();
    }
    let reopened = Store::open(dir.path(), FakeClock::new()).unwrap();
    assert_eq!(reopened.read(|s| s.jobs[&id].status), jobtree_core::JobStatus::Running);
}
