// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Cache Service (`§4.6`): freshness check and revision management
//! over the document store, keyed by `(jobdef_id, step_name, hash?)`
//! cache tags.

use crate::error::CacheError;
use jobtree_core::{is_fresh, CacheConfig, CacheTags, Clock};
use jobtree_storage::{DocumentRecord, DocumentStore};
use std::sync::Arc;

const DAY_MS: u64 = 24 * 3_600_000;

pub struct CacheService<D, C> {
    docs: Arc<D>,
    clock: C,
}

impl<D, C> Clone for CacheService<D, C>
where
    C: Clone,
{
    fn clone(&self) -> Self {
        Self { docs: Arc::clone(&self.docs), clock: self.clock.clone() }
    }
}

impl<D, C> CacheService<D, C>
where
    D: DocumentStore,
    C: Clock,
{
    pub fn new(docs: Arc<D>, clock: C) -> Self {
        Self { docs, clock }
    }

    /// `IsFresh(doc, cfg)` from `§3`'s freshness table, evaluated against
    /// the current clock.
    pub fn is_fresh(&self, doc: &DocumentRecord, cfg: &CacheConfig, requested_hash: Option<&str>) -> bool {
        is_fresh(&doc.meta(), cfg, requested_hash, self.clock.epoch_ms(), self.today_start_ms())
    }

    /// Extracts `jobdef_id`/`step_name` from `tags`, queries the document
    /// store, sorts candidates by `last_synced` descending, and returns the
    /// first revision-1 document that matches the optional requested hash
    /// and passes the freshness policy (`§4.6`).
    pub fn get_fresh_document(
        &self,
        tags: &CacheTags,
        cfg: &CacheConfig,
    ) -> Result<Option<DocumentRecord>, CacheError> {
        if !cfg.enabled {
            return Ok(None);
        }
        let mut candidates = self.docs.find_by_tags(&tags.jobdef_id, &tags.step_name);
        candidates.sort_by(|a, b| b.last_synced_ms.cmp(&a.last_synced_ms));
        let found = candidates
            .into_iter()
            .filter(|doc| doc.revision == 1)
            .find(|doc| self.is_fresh(doc, cfg, tags.hash.as_deref()));
        Ok(found)
    }

    /// Delete revisions whose number exceeds `keep` for `(jobdef_id,
    /// step_name)` (`§4.5` step 5, `§4.6`).
    pub fn cleanup_revisions(&self, jobdef_id: &str, step_name: &str, keep: u32) -> Result<(), CacheError> {
        self.docs.delete_revisions_over(jobdef_id, step_name, keep);
        Ok(())
    }

    /// Delete every document tagged with `jobdef_id`, used when the
    /// definition's content changes and must force a full re-run (`§4.6`).
    pub fn cleanup_by_jobdef_id(&self, jobdef_id: &str) -> Result<(), CacheError> {
        self.docs.delete_by_jobdef_id(jobdef_id);
        Ok(())
    }

    /// Highest revision number seen for `(jobdef_id, step_name)`; `0` if
    /// no document has been tagged yet (`§4.6`).
    pub fn get_current_revision(&self, jobdef_id: &str, step_name: &str) -> Result<u32, CacheError> {
        Ok(self.docs.find_by_tags(jobdef_id, step_name).into_iter().map(|d| d.revision).max().unwrap_or(0))
    }

    fn today_start_ms(&self) -> u64 {
        let now_ms = self.clock.epoch_ms();
        now_ms - (now_ms % DAY_MS)
    }
}

#[cfg(test)]
#[path = "cache_service_tests.rs"]
mod tests;
