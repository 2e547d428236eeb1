// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jobtree-storage: the durable job store, persistent queue, and log sink
//! behind the job orchestration engine.
//!
//! Every mutation is first appended to a write-ahead log (`wal`) as a
//! `StorageOp` record, then applied to the in-memory `MaterializedState`
//! (`state`) that `JobStore`, `Queue`, and `LogStore` read from. Periodic
//! zstd-compressed snapshots (`snapshot`) bound how much of the WAL a fresh
//! process has to replay; `migration` carries old snapshot formats forward.
//! `doc_store` is the external document-store contract the Cache Service
//! (in `jobtree-engine`) depends on.

pub mod doc_store;
pub mod error;
pub mod job_store;
pub mod log_store;
mod migration;
pub mod ops;
pub mod queue_store;
mod snapshot;
mod state;
mod store;
mod wal;

pub use doc_store::{DocumentRecord, DocumentStore};
pub use error::{MigrationError, QueueError, StoreError, WalError};
pub use job_store::{ChildStats, JobFilter, JobStore, OrderBy, OrderDir, StepStats, ROOT_PARENT};
pub use log_store::LogStore;
pub use migration::{Migration, MigrationRegistry, CURRENT_SNAPSHOT_VERSION};
pub use ops::StorageOp;
pub use queue_store::{Queue, QueueConfig};
pub use state::MaterializedState;
pub use store::Store;
pub use wal::{Wal, WalEntry};

#[cfg(any(test, feature = "test-support"))]
pub use doc_store::fake;
#[cfg(any(test, feature = "test-support"))]
pub use doc_store::fake::FakeDocumentStore;
