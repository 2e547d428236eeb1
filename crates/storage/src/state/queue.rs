// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue message mutation handlers (`§4.1`).

use super::{MaterializedState, VisibilityKey};
use crate::ops::StorageOp;

pub(super) fn apply(state: &mut MaterializedState, op: &StorageOp) {
    match op {
        StorageOp::Enqueue { message } => {
            state.visibility_index.insert(VisibilityKey(message.visible_at_ms, message.id));
            state.queue.insert(message.id, message.clone());
        }

        StorageOp::ReceiveMessage { id, visible_at_ms, receive_count } => {
            if let Some(msg) = state.queue.get_mut(id) {
                state.visibility_index.remove(&VisibilityKey(msg.visible_at_ms, msg.id));
                msg.visible_at_ms = *visible_at_ms;
                msg.receive_count = *receive_count;
                state.visibility_index.insert(VisibilityKey(msg.visible_at_ms, msg.id));
            }
        }

        StorageOp::ExtendVisibility { id, visible_at_ms } => {
            if let Some(msg) = state.queue.get_mut(id) {
                state.visibility_index.remove(&VisibilityKey(msg.visible_at_ms, msg.id));
                msg.visible_at_ms = *visible_at_ms;
                state.visibility_index.insert(VisibilityKey(msg.visible_at_ms, msg.id));
            }
        }

        StorageOp::DeleteMessage { id } | StorageOp::PurgeMessage { id } => {
            if let Some(msg) = state.queue.remove(id) {
                state.visibility_index.remove(&VisibilityKey(msg.visible_at_ms, msg.id));
            }
        }

        _ => {}
    }
}
