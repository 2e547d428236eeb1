// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The document store contract (`§4.6`, `§1` Non-goals: "the search /
//! document / embedding services ... only their contracts appear here").
//! The Cache Service depends on this trait; no concrete implementation
//! ships here — a real deployment wires in whatever document/embedding
//! service owns the actual content.

use jobtree_core::CachedDocMeta;

/// One document the Cache Service can consider for a freshness check.
/// `revision` and `content_hash` correspond to a `CacheTags`' `revision`
/// and `hash` (`§3`).
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub jobdef_id: String,
    pub step_name: String,
    pub revision: u32,
    pub content_hash: Option<String>,
    pub last_synced_ms: u64,
}

impl DocumentRecord {
    pub fn meta(&self) -> CachedDocMeta {
        CachedDocMeta { last_synced_ms: self.last_synced_ms, hash: self.content_hash.clone() }
    }
}

/// External document store contract (`§4.6`). Implementations back this
/// with whatever document/embedding service is deployed; the Cache Service
/// only ever calls through this trait.
pub trait DocumentStore: Send + Sync {
    /// All documents tagged with `(jobdef_id, step_name)`, in no particular
    /// order — `CacheService::get_fresh_document` sorts by `last_synced`
    /// descending itself.
    fn find_by_tags(&self, jobdef_id: &str, step_name: &str) -> Vec<DocumentRecord>;

    /// Delete every document tagged with `(jobdef_id, step_name)` whose
    /// `revision` exceeds `keep`.
    fn delete_revisions_over(&self, jobdef_id: &str, step_name: &str, keep: u32);

    /// Delete every document tagged with `jobdef_id`, regardless of step.
    fn delete_by_jobdef_id(&self, jobdef_id: &str);
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    //! An in-memory `DocumentStore` for tests of the Cache Service and
    //! dispatcher, mirroring `jobtree_core::JobNodeBuilder`'s test-support
    //! gating.

    use super::{DocumentRecord, DocumentStore};
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct FakeDocumentStore {
        docs: Mutex<Vec<DocumentRecord>>,
    }

    impl FakeDocumentStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, doc: DocumentRecord) {
            self.docs.lock().push(doc);
        }
    }

    impl DocumentStore for FakeDocumentStore {
        fn find_by_tags(&self, jobdef_id: &str, step_name: &str) -> Vec<DocumentRecord> {
            self.docs
                .lock()
                .iter()
                .filter(|d| d.jobdef_id == jobdef_id && d.step_name == step_name)
                .cloned()
                .collect()
        }

        fn delete_revisions_over(&self, jobdef_id: &str, step_name: &str, keep: u32) {
            self.docs
                .lock()
                .retain(|d| !(d.jobdef_id == jobdef_id && d.step_name == step_name && d.revision > keep));
        }

        fn delete_by_jobdef_id(&self, jobdef_id: &str) {
            self.docs.lock().retain(|d| d.jobdef_id != jobdef_id);
        }
    }
}

#[cfg(test)]
#[path = "doc_store_tests.rs"]
mod tests;
