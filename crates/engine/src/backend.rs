// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Backend` is the storage surface every engine component needs: job
//! records, logs, and the persistent queue. `jobtree_storage::Store<C>`
//! is the only real implementation; the blanket impl lets engine
//! components take a single `S: Backend` bound instead of three.

use jobtree_storage::{JobStore, LogStore, Queue};

pub trait Backend: JobStore + LogStore + Queue + Send + Sync {}

impl<S: JobStore + LogStore + Queue + Send + Sync> Backend for S {}
