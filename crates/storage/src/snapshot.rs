// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic zstd-compressed snapshots of `MaterializedState`, so recovery
//! can skip replaying the WAL from the beginning of time (`§11`).

use crate::error::StoreError;
use crate::migration::{MigrationRegistry, CURRENT_SNAPSHOT_VERSION};
use crate::state::MaterializedState;
use serde_json::json;
use std::fs;
use std::path::Path;

const ZSTD_LEVEL: i32 = 3;

/// Write `state` (at WAL sequence `seq`) to `path`, zstd-compressed.
pub fn save(path: impl AsRef<Path>, seq: u64, state: &MaterializedState) -> Result<(), StoreError> {
    let envelope = json!({
        "v": CURRENT_SNAPSHOT_VERSION,
        "seq": seq,
        "state": state,
    });
    let bytes = serde_json::to_vec(&envelope)?;
    let compressed = zstd::encode_all(bytes.as_slice(), ZSTD_LEVEL)
        .map_err(|e| StoreError::Io(e))?;

    let tmp = path.as_ref().with_extension("snap.tmp");
    fs::write(&tmp, compressed)?;
    fs::rename(&tmp, path.as_ref())?;
    Ok(())
}

/// Load the sequence number and materialized state from a snapshot file,
/// running it through the migration registry first. Returns `None` if no
/// snapshot exists yet (fresh store: replay the WAL from the start).
pub fn load(
    path: impl AsRef<Path>,
    registry: &MigrationRegistry,
) -> Result<Option<(u64, MaterializedState)>, StoreError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let compressed = fs::read(path)?;
    let bytes = zstd::decode_all(compressed.as_slice()).map_err(StoreError::Io)?;
    let raw: serde_json::Value = serde_json::from_slice(&bytes)?;
    let migrated = registry
        .migrate_to(raw, CURRENT_SNAPSHOT_VERSION)
        .map_err(|e| StoreError::Transient(e.to_string()))?;

    let seq = migrated.get("seq").and_then(serde_json::Value::as_u64).unwrap_or(0);
    let state: MaterializedState = serde_json::from_value(
        migrated.get("state").cloned().unwrap_or(serde_json::Value::Null),
    )?;
    Ok(Some((seq, state)))
}
