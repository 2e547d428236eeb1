// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable `Store`: a WAL of `StorageOp` records plus the
//! `MaterializedState` derived by replaying them. `JobStore`, `Queue`, and
//! `LogStore` are all thin trait views over the same `Store` (`§4.1`-`§4.3`).
//!
//! Writers are serialized behind a single mutex, matching the single-writer
//! embedded-KV assumption in `§1`: every mutation appends to the WAL and
//! applies to the in-memory state under the same critical section.

use crate::error::StoreError;
use crate::migration::MigrationRegistry;
use crate::ops::StorageOp;
use crate::snapshot;
use crate::state::MaterializedState;
use crate::wal::Wal;
use jobtree_core::Clock;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Snapshot is taken after this many WAL appends since the last one.
const SNAPSHOT_OP_INTERVAL: u64 = 500;

struct Durable {
    wal: Wal<StorageOp>,
    snapshot_path: PathBuf,
    ops_since_snapshot: u64,
}

/// Combines the write-ahead log with the derived, queryable state. Clone is
/// cheap (`Arc` internals) so the same store can be shared across the
/// dispatcher, worker pool, and job manager.
#[derive(Clone)]
pub struct Store<C: Clock> {
    state: Arc<RwLock<MaterializedState>>,
    durable: Arc<Mutex<Option<Durable>>>,
    clock: C,
}

impl<C: Clock> Store<C> {
    /// An in-memory-only store with no WAL or snapshot file, for tests that
    /// don't care about crash recovery.
    pub fn in_memory(clock: C) -> Self {
        Self {
            state: Arc::new(RwLock::new(MaterializedState::default())),
            durable: Arc::new(Mutex::new(None)),
            clock,
        }
    }

    /// Open (or create) a durable store at `dir`: `dir/wal.jsonl` and
    /// `dir/snapshot.zst`. Recovery loads the snapshot (if any) then replays
    /// WAL entries with `seq` past the snapshot's high-water mark.
    pub fn open(dir: impl AsRef<Path>, clock: C) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let wal_path = dir.join("wal.jsonl");
        let snapshot_path = dir.join("snapshot.zst");

        let registry = MigrationRegistry::new();
        let loaded = snapshot::load(&snapshot_path, &registry)?;
        let (processed_seq, mut state) = match loaded {
            Some((seq, state)) => (seq, state),
            None => (0, MaterializedState::default()),
        };

        let mut wal = Wal::<StorageOp>::open(&wal_path, processed_seq)?;
        let mut replayed = 0u64;
        while let Some(entry) = wal.next_unprocessed()? {
            state.apply(&entry.event);
            replayed += 1;
        }
        state.reindex();
        debug!(replayed, processed_seq, "storage: recovered from snapshot + wal");

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            durable: Arc::new(Mutex::new(Some(Durable { wal, snapshot_path, ops_since_snapshot: 0 }))),
            clock,
        })
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&MaterializedState) -> T) -> T {
        f(&self.state.read())
    }

    /// Append `op` to the WAL (if durable) and apply it to the in-memory
    /// state under one critical section, then flush when the WAL's batching
    /// gate says it's time (`§5`: bounded batching, not an fsync per write).
    pub(crate) fn commit(&self, op: StorageOp) -> Result<(), StoreError> {
        self.commit_with(|_state| Some((op, ()))).map(|_| ())
    }

    /// Like `commit`, but `select` picks (or declines) the op to append
    /// *after* the state write lock is already held, so reading the state
    /// to decide what to write and applying that write happen in one
    /// atomic critical section. Needed for mutations whose op depends on
    /// a value read from state (e.g. `Queue::receive`'s "claim whichever
    /// message is currently the head of the visibility index" — selecting
    /// the candidate via a separate `read()` and then `commit()`-ing the
    /// claim would let two callers pick the same candidate before either
    /// claims it). Returns `None` when `select` produces no op (nothing to
    /// commit — e.g. no message is currently visible).
    pub(crate) fn commit_with<T>(
        &self,
        select: impl FnOnce(&MaterializedState) -> Option<(StorageOp, T)>,
    ) -> Result<Option<T>, StoreError> {
        let mut state = self.state.write();
        let Some((op, value)) = select(&state) else { return Ok(None) };

        let mut durable = self.durable.lock();
        if let Some(d) = durable.as_mut() {
            d.wal.append(&op)?;
            d.ops_since_snapshot += 1;
            if d.wal.needs_flush() {
                d.wal.flush()?;
            }
        }
        drop(durable);

        state.apply(&op);
        drop(state);

        let mut durable = self.durable.lock();
        if let Some(d) = durable.as_mut() {
            if d.ops_since_snapshot >= SNAPSHOT_OP_INTERVAL {
                let seq = d.wal.write_seq();
                let snapshot_state = self.state.read().clone();
                if let Err(err) = snapshot::save(&d.snapshot_path, seq, &snapshot_state) {
                    warn!(%err, "storage: periodic snapshot failed");
                } else {
                    d.wal.mark_processed(seq);
                    d.wal.truncate_before(seq + 1)?;
                    d.ops_since_snapshot = 0;
                }
            }
        }
        Ok(Some(value))
    }

    /// Force a snapshot now and truncate the WAL up to it, regardless of
    /// `SNAPSHOT_OP_INTERVAL`. Used by graceful shutdown.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        let mut durable = self.durable.lock();
        let Some(d) = durable.as_mut() else { return Ok(()) };
        d.wal.flush()?;
        let seq = d.wal.write_seq();
        let state = self.state.read().clone();
        snapshot::save(&d.snapshot_path, seq, &state)?;
        d.wal.mark_processed(seq);
        d.wal.truncate_before(seq + 1)?;
        d.ops_since_snapshot = 0;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
