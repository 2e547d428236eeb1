// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only, single-writer write-ahead log.
//!
//! Every mutation to the job store, queue, or log sink is first appended
//! here as a JSON-lines record before the in-memory `MaterializedState` is
//! updated (`§1` Non-goals: "a single-writer embedded store is assumed").
//! Generic over the record type so the job store, queue, and log sink can
//! each keep their own narrow WAL record enum (`crate::state`) while
//! sharing one on-disk format and recovery path.

use crate::error::WalError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Appends needed to trigger `needs_flush` regardless of elapsed time.
const FLUSH_COUNT_THRESHOLD: usize = 100;
/// Elapsed time since the last flush that also triggers `needs_flush`.
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
/// Number of rotated backups kept when a corrupt WAL is recovered at open.
const MAX_BACKUPS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry<E> {
    pub seq: u64,
    pub event: E,
}

/// A single-writer, append-only log of `E` records at `path`.
pub struct Wal<E> {
    path: PathBuf,
    file: File,
    write_seq: u64,
    processed_seq: u64,
    read_cursor: u64,
    unflushed: usize,
    last_flush: Instant,
    _marker: PhantomData<E>,
}

impl<E> Wal<E>
where
    E: Serialize + DeserializeOwned,
{
    /// Open (creating if absent) the WAL at `path`. `processed_seq` is the
    /// high-water mark recorded in the last snapshot: `next_unprocessed`
    /// will only surface entries with `seq > processed_seq`.
    ///
    /// A corrupt tail (invalid UTF-8 or invalid JSON) is detected here and
    /// repaired: the original file is rotated into `.bak`/`.bak.2`/`.bak.3`
    /// (oldest evicted) and the file at `path` is rewritten with only the
    /// entries that parsed cleanly.
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            File::create(&path)?;
        }

        let raw = fs::read(&path)?;
        let (valid, all_clean) = parse_lines::<E>(&raw);
        if !all_clean {
            recover(&path, &valid)?;
        }

        let write_seq = valid.last().map(|e| e.seq).unwrap_or(0);
        let file = OpenOptions::new().append(true).open(&path)?;

        Ok(Self {
            path,
            file,
            write_seq,
            processed_seq,
            read_cursor: processed_seq,
            unflushed: 0,
            last_flush: Instant::now(),
            _marker: PhantomData,
        })
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// Append `event`, returning its assigned sequence number.
    pub fn append(&mut self, event: &E) -> Result<u64, WalError> {
        let seq = self.write_seq + 1;
        let line = serde_json::to_string(&WalEntry { seq, event })?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.write_seq = seq;
        self.unflushed += 1;
        Ok(seq)
    }

    /// Durably persist appended records (fsync) and reset the flush gate.
    pub fn flush(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        self.unflushed = 0;
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Whether enough unflushed writes (or enough time) have accumulated
    /// that the caller should call `flush` (`§5`: bounded batching, not a
    /// fsync per mutation).
    pub fn needs_flush(&self) -> bool {
        self.unflushed >= FLUSH_COUNT_THRESHOLD || self.last_flush.elapsed() >= FLUSH_INTERVAL
    }

    /// Mark `seq` as reflected in a durable snapshot, advancing the
    /// high-water mark used by a future `open`.
    pub fn mark_processed(&mut self, seq: u64) {
        if seq > self.processed_seq {
            self.processed_seq = seq;
        }
    }

    /// The next entry with `seq` greater than the internal read cursor, or
    /// `None` if there isn't one yet. Re-reads the file from disk each call
    /// (another process/handle may have appended since the last read) and
    /// silently skips any line that fails to parse rather than erroring.
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry<E>>, WalError> {
        let raw = fs::read(&self.path)?;
        let (valid, _) = parse_lines::<E>(&raw);
        let next = valid.into_iter().find(|e| e.seq > self.read_cursor);
        if let Some(entry) = &next {
            self.read_cursor = entry.seq;
        }
        Ok(next)
    }

    /// All entries with `seq > since_seq`, re-read from disk. Stops at (and
    /// silently drops) any unparsable line rather than failing the call.
    pub fn entries_after(&self, since_seq: u64) -> Result<Vec<WalEntry<E>>, WalError> {
        let raw = fs::read(&self.path)?;
        let (valid, _) = parse_lines::<E>(&raw);
        Ok(valid.into_iter().filter(|e| e.seq > since_seq).collect())
    }

    /// Drop every entry with `seq < keep_from_seq` from the on-disk log,
    /// e.g. right after a snapshot makes them redundant for recovery.
    pub fn truncate_before(&mut self, keep_from_seq: u64) -> Result<(), WalError> {
        let raw = fs::read(&self.path)?;
        let (valid, _) = parse_lines::<E>(&raw);
        let kept: Vec<_> = valid.into_iter().filter(|e| e.seq >= keep_from_seq).collect();
        rewrite(&self.path, &kept)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(())
    }
}

/// Parse newline-delimited JSON `WalEntry<E>` records. Returns the entries
/// that parsed successfully (in file order, skipping bad lines) plus
/// whether every non-empty line parsed cleanly.
fn parse_lines<E: DeserializeOwned>(raw: &[u8]) -> (Vec<WalEntry<E>>, bool) {
    let mut valid = Vec::new();
    let mut all_clean = true;
    for line in BufReader::new(raw).lines() {
        let Ok(line) = line else {
            all_clean = false;
            continue;
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<WalEntry<E>>(&line) {
            Ok(entry) => valid.push(entry),
            Err(_) => all_clean = false,
        }
    }
    (valid, all_clean)
}

fn rewrite<E: Serialize>(path: &Path, entries: &[WalEntry<E>]) -> Result<(), WalError> {
    let mut file = File::create(path)?;
    for entry in entries {
        let line = serde_json::to_string(entry)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
    }
    file.sync_all()?;
    Ok(())
}

/// Rotate `.bak`/`.bak.2`/`.bak.3` (evicting the oldest) then move the
/// corrupt file there, leaving a freshly written, clean file at `path`.
fn recover<E: Serialize>(path: &Path, valid: &[WalEntry<E>]) -> Result<(), WalError> {
    rotate_backups(path, MAX_BACKUPS)?;
    let bak = path.with_extension("bak");
    fs::rename(path, &bak)?;
    rewrite(path, valid)?;
    Ok(())
}

fn rotate_backups(path: &Path, max: u32) -> std::io::Result<()> {
    let ext = |n: u32| if n <= 1 { "bak".to_string() } else { format!("bak.{n}") };
    let oldest = path.with_extension(ext(max));
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max).rev() {
        let from = path.with_extension(ext(n));
        let to = path.with_extension(ext(n + 1));
        if from.exists() {
            fs::rename(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
