// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jobtree-engine: the dispatch layer of the job orchestration engine.
//!
//! `job_manager` is the facade every mutation goes through; `event_bus`
//! fans status and progress events out to subscribers; `cache_service`
//! and `step_manager` implement the per-step cache lookup and worker
//! registry (`§4.5`, `§4.6`); `dispatcher` drives a `JobDefinition`
//! through its manager → step → leaf tree (`§4.7`); `worker_pool` is the
//! queue-side consumer that executes leaf jobs (`§4.8`).

pub mod backend;
pub mod cache_service;
pub mod dispatcher;
pub mod error;
pub mod event_bus;
pub mod job_manager;
pub mod meta;
pub mod placeholder;
pub mod step_manager;
pub mod worker_pool;

pub use backend::Backend;
pub use cache_service::CacheService;
pub use dispatcher::Dispatcher;
pub use error::{CacheError, DispatchError, WorkerPoolError};
pub use event_bus::{EventBus, EventHandler};
pub use job_manager::{read_step_stats, JobManager, StatusReport, StepStatEntry};
pub use placeholder::{resolve_placeholders, KvStore};
pub use step_manager::{ExecuteOutcome, StepManager};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
