// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot schema migrations. A snapshot envelope carries a version
//! number (`§10.1`/`§11`); on load, `MigrationRegistry` walks a chain of
//! single-step migrations from the stored version up to the version this
//! build understands, so an older on-disk snapshot keeps loading across
//! releases that add fields to `MaterializedState`.

use crate::error::MigrationError;
use serde_json::Value;

/// The current snapshot schema version this build writes and reads.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

pub trait Migration: Send + Sync {
    fn source_version(&self) -> u32;
    fn target_version(&self) -> u32;
    fn migrate(&self, snapshot: &mut Value) -> Result<(), MigrationError>;
}

#[derive(Default)]
pub struct MigrationRegistry {
    pub(crate) migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self { migrations: Vec::new() }
    }

    /// Migrate a raw `{v, seq, state}` envelope up to `target_version`,
    /// applying registered single-step migrations in order. A no-op if the
    /// envelope is already at `target_version`.
    pub fn migrate_to(&self, mut snapshot: Value, target_version: u32) -> Result<Value, MigrationError> {
        let mut current = snapshot
            .get("v")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or(target_version);

        if current == target_version {
            return Ok(snapshot);
        }
        if current > target_version {
            return Err(MigrationError::TooNew(current, target_version));
        }

        while current < target_version {
            let step = self
                .migrations
                .iter()
                .find(|m| m.source_version() == current)
                .ok_or(MigrationError::NoPath(current, target_version))?;
            step.migrate(&mut snapshot)?;
            current = step.target_version();
            if let Some(obj) = snapshot.as_object_mut() {
                obj.insert("v".into(), current.into());
            }
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;
