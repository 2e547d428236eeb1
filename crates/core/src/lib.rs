// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jobtree-core: shared types for the job orchestration engine.
//!
//! Defines the job tree's data model (`job`), the persistent queue's
//! message shape (`queue`), the log/event fabric (`log`, `event`), job
//! definitions (`jobdef`), the cache policy (`cache`), and the `Worker` /
//! `StepMonitor` / `JobMonitor` contracts external collaborators
//! implement. Storage and dispatch live in `jobtree-storage` and
//! `jobtree-engine`.

pub mod macros;

pub mod cache;
pub mod clock;
pub mod error;
pub mod event;
pub mod id;
pub mod job;
pub mod jobdef;
pub mod log;
pub mod monitor;
pub mod queue;
pub mod status;
pub mod worker;

pub use cache::{is_fresh, CacheConfig, CacheConfigPatch, CacheTags, CacheType, CachedDocMeta};
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::CoreError;
pub use event::Event;
pub use id::{short, IdBuf};
pub use job::{JobId, JobNode, Progress};
#[cfg(any(test, feature = "test-support"))]
pub use job::JobNodeBuilder;
pub use jobdef::{ErrorTolerance, FailureAction, JobDefinition, OnError, StepDefinition};
pub use log::{HierarchyContext, LogEntry, LogLevel, Originator, Phase};
pub use monitor::{JobMonitor, StepMonitor};
pub use queue::{ConfigMap, JobMessage, MessageId, QueueMessage};
pub use status::{JobStatus, NodeKind};
pub use worker::{Worker, WorkerExecuteContext, WorkerInitContext, WorkerInitResult};
