// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine-layer error taxonomy. Composes `jobtree_core::CoreError` and the
//! storage crate's `StoreError`/`QueueError` with the dispatch- and
//! worker-pool-specific variants from `§7`.

use jobtree_core::CoreError;
use jobtree_storage::{QueueError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no worker registered for step type {0:?}")]
    UnknownWorkerType(String),

    #[error("error tolerance exceeded: {failed}/{max} failed children")]
    ToleranceExceeded { failed: u32, max: u32 },

    #[error("timed out after {0:?} waiting for step children")]
    Timeout(std::time::Duration),
}

impl DispatchError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::Core(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum WorkerPoolError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
