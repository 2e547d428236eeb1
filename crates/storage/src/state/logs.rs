// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log-sink mutation handler (`§4.3`).

use super::MaterializedState;
use crate::ops::StorageOp;

pub(super) fn apply(state: &mut MaterializedState, op: &StorageOp) {
    if let StorageOp::AppendLog { job_id, entry } = op {
        state.logs.entry(*job_id).or_default().push((**entry).clone());
    }
}
