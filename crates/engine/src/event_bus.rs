// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pub/sub event bus (`§4.3`): `Publish(ctx, event)` / `Subscribe(type,
//! handler)`. Delivery is best-effort asynchronous and must never block
//! the publishing caller; each handler invocation runs on its own task so
//! a slow or panicking subscriber cannot stall the mutation that
//! triggered it (`§7`: "Event-publish errors are logged and swallowed").
//!
//! This is a notification fabric, not the durable record — `AppendLog`
//! and the job store are the source of truth; subscribers see events on
//! a best-effort basis and must treat persisted state as authoritative
//! (`§5`: "Events across subscribers are not globally ordered").

use jobtree_core::Event;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<&'static str, Vec<EventHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every event whose `Event::kind()` equals `kind`.
    pub fn subscribe(&self, kind: &'static str, handler: EventHandler) {
        self.subscribers.write().entry(kind).or_default().push(handler);
    }

    /// Fan the event out to every matching subscriber on its own task.
    /// Never blocks, never propagates a subscriber's panic or error.
    pub fn publish(&self, event: Event) {
        let kind = event.kind();
        let handlers = {
            let subscribers = self.subscribers.read();
            subscribers.get(kind).cloned().unwrap_or_default()
        };
        for handler in handlers {
            let event = event.clone();
            tokio::spawn(async move {
                if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                    tracing::error!(kind, "event subscriber panicked");
                }
            });
        }
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
