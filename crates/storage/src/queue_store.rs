// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persistent visibility-timeout queue (`§4.1`). Messages are indexed
//! by `visible_at`; `receive` scans ascending, oldest visible first, ties
//! broken by ID, and stops as soon as it sees a message not yet visible.

use crate::error::QueueError;
use crate::ops::StorageOp;
use crate::store::Store;
use jobtree_core::{Clock, JobId, MessageId, QueueMessage};
use tracing::warn;

/// Queue defaults per `§4.8`.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub visibility_timeout_ms: u64,
    pub max_receive: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { visibility_timeout_ms: 5 * 60 * 1000, max_receive: 3 }
    }
}

pub trait Queue {
    fn enqueue(&self, job_id: JobId, job_type: String, payload: Vec<u8>) -> Result<MessageId, QueueError>;

    /// Returns the claimed message, or `Err(QueueError::NoMessage)` if none
    /// are currently visible. A message whose `receive_count` has already
    /// reached `max_receive` is purged and skipped rather than returned.
    fn receive(&self, config: &QueueConfig) -> Result<QueueMessage, QueueError>;

    fn extend(&self, id: MessageId, visibility_timeout_ms: u64) -> Result<(), QueueError>;

    /// Idempotent: deleting an already-gone message is not an error.
    fn delete(&self, id: MessageId) -> Result<(), QueueError>;
}

/// Outcome of one atomic select-and-claim pass inside `receive`.
enum ReceiveAttempt {
    Purged(MessageId),
    Claimed(QueueMessage),
}

impl<C: Clock> Queue for Store<C> {
    fn enqueue(&self, job_id: JobId, job_type: String, payload: Vec<u8>) -> Result<MessageId, QueueError> {
        let now_ms = self.clock().epoch_ms();
        let message = QueueMessage {
            id: MessageId::new(),
            job_id,
            job_type,
            payload,
            enqueued_at_ms: now_ms,
            visible_at_ms: now_ms,
            receive_count: 0,
            dedup_id: None,
        };
        let id = message.id;
        self.commit(StorageOp::Enqueue { message })?;
        Ok(id)
    }

    /// Selects the head of the visibility index and claims (or purges) it
    /// in the same `commit_with` critical section, so two worker loops can
    /// never both pick the same candidate before either claims it (P4:
    /// only one `Receive` returns a given message per visibility window).
    fn receive(&self, config: &QueueConfig) -> Result<QueueMessage, QueueError> {
        let now_ms = self.clock().epoch_ms();
        loop {
            let attempt = self.commit_with(|s| {
                let message = s
                    .visibility_index
                    .iter()
                    .next()
                    .filter(|key| key.0 <= now_ms)
                    .and_then(|key| s.queue.get(&key.1).cloned())?;

                if message.receive_count >= config.max_receive {
                    Some((StorageOp::PurgeMessage { id: message.id }, ReceiveAttempt::Purged(message.id)))
                } else {
                    let visible_at_ms = now_ms + config.visibility_timeout_ms;
                    let receive_count = message.receive_count + 1;
                    let op = StorageOp::ReceiveMessage { id: message.id, visible_at_ms, receive_count };
                    let claimed = QueueMessage { visible_at_ms, receive_count, ..message };
                    Some((op, ReceiveAttempt::Claimed(claimed)))
                }
            })?;

            match attempt {
                None => return Err(QueueError::NoMessage),
                Some(ReceiveAttempt::Purged(id)) => {
                    warn!(message_id = %id, "queue: purging message past max_receive");
                    continue;
                }
                Some(ReceiveAttempt::Claimed(message)) => return Ok(message),
            }
        }
    }

    fn extend(&self, id: MessageId, visibility_timeout_ms: u64) -> Result<(), QueueError> {
        let exists = self.read(|s| s.queue.contains_key(&id));
        if !exists {
            return Err(crate::error::StoreError::NotFound(id.to_string()).into());
        }
        let visible_at_ms = self.clock().epoch_ms() + visibility_timeout_ms;
        self.commit(StorageOp::ExtendVisibility { id, visible_at_ms })?;
        Ok(())
    }

    fn delete(&self, id: MessageId) -> Result<(), QueueError> {
        self.commit(StorageOp::DeleteMessage { id })?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "queue_store_tests.rs"]
mod tests;
