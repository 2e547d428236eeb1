// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage-layer error taxonomy. See `§7 ERROR HANDLING DESIGN`.

use thiserror::Error;

/// Errors from the job/log store. Distinguishes `NotFound` (not an error
/// to most callers) from I/O and serialization failures per `§4.1`/`§4.2`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    #[error("transient: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// The queue's distinguished "nothing to receive" signal (`§4.1`): not an
/// error to callers, but modeled as one so `Receive` composes with `?`.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no message available")]
    NoMessage,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("snapshot version {0} is newer than supported version {1}")]
    TooNew(u32, u32),

    #[error("no migration path from version {0} to {1}")]
    NoPath(u32, u32),
}
