// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the workspace. See `§7 ERROR HANDLING DESIGN`.

use thiserror::Error;

/// Errors a worker, the step manager, or the dispatcher can surface.
///
/// Storage- and queue-specific errors (`StoreError`, `QueueError`) live in
/// `jobtree-storage` and convert into this taxonomy via `#[from]` at the
/// engine layer, matching the teacher's pattern of per-crate leaf errors
/// composed with `thiserror` at call boundaries.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("dependency failed: step {0:?} is in failed_steps")]
    DependencyFailed(Vec<String>),

    #[error("init failed: {0}")]
    InitFailed(String),

    #[error("execute failed: {0}")]
    ExecuteFailed(String),

    #[error("timed out waiting for children after {0:?}")]
    Timeout(std::time::Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("error tolerance exceeded: {failed}/{max} failed children")]
    ToleranceExceeded { failed: u32, max: u32 },

    #[error("transient error: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    /// Whether this error class is safe to retry (`§7`: "Transient — storage
    /// contention; retryable").
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
