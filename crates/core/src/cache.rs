// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cache policy types and the pure freshness check. See `§3` (cache tags,
//! freshness table) and `§4.6 Cache Service`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    #[default]
    None,
    RollingTime,
    HardTime,
    /// Treated as `rolling_time` with a 24h window (stub), per `§3`.
    Auto,
}

/// Per-step (merged with per-jobdef) cache configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub cache_type: CacheType,
    pub hours: u32,
    pub revisions: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: false, cache_type: CacheType::None, hours: 24, revisions: 1 }
    }
}

impl CacheConfig {
    /// Merge step-level options over jobdef-level defaults (`§4.5` step 1).
    /// Step-level `Some` fields win; absent fields fall back to `base`.
    pub fn merge(base: CacheConfig, overlay: Option<CacheConfigPatch>) -> CacheConfig {
        let Some(overlay) = overlay else { return base };
        CacheConfig {
            enabled: overlay.enabled.unwrap_or(base.enabled),
            cache_type: overlay.cache_type.unwrap_or(base.cache_type),
            hours: overlay.hours.unwrap_or(base.hours),
            revisions: overlay.revisions.unwrap_or(base.revisions),
        }
    }
}

/// Partial cache config, as carried in step/jobdef config maps before merge.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheConfigPatch {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(rename = "type", default)]
    pub cache_type: Option<CacheType>,
    #[serde(default)]
    pub hours: Option<u32>,
    #[serde(default)]
    pub revisions: Option<u32>,
}

/// `(jobdef:<id>, step:<name>, revision:<n>, hash:<content_hash>?)` — the
/// cache lookup key described in `§3`/`§6`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTags {
    pub jobdef_id: String,
    pub step_name: String,
    pub revision: u32,
    pub hash: Option<String>,
}

impl CacheTags {
    pub fn new(jobdef_id: impl Into<String>, step_name: impl Into<String>, revision: u32) -> Self {
        Self { jobdef_id: jobdef_id.into(), step_name: step_name.into(), revision, hash: None }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Render as `key:value` tag strings, sanitized per `§6`:
    /// lowercase, spaces -> `-`, keep `[a-z0-9_-]`, drop everything else.
    pub fn to_tags(&self) -> Vec<String> {
        let mut tags = vec![
            format!("jobdef:{}", sanitize(&self.jobdef_id)),
            format!("step:{}", sanitize(&self.step_name)),
            format!("revision:{}", self.revision),
        ];
        if let Some(hash) = &self.hash {
            tags.push(format!("hash:{}", sanitize(hash)));
        }
        tags
    }
}

pub fn sanitize(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// The subset of a cached document's metadata the freshness check needs.
#[derive(Debug, Clone)]
pub struct CachedDocMeta {
    pub last_synced_ms: u64,
    pub hash: Option<String>,
}

/// `IsFresh(doc, cfg)` from `§3`'s freshness table.
///
/// `now_ms` and `today_start_ms` (midnight UTC of the current day, in
/// epoch ms) are passed in rather than read from a clock so this stays a
/// pure function: callers own the clock.
pub fn is_fresh(
    doc: &CachedDocMeta,
    cfg: &CacheConfig,
    requested_hash: Option<&str>,
    now_ms: u64,
    today_start_ms: u64,
) -> bool {
    if let Some(requested) = requested_hash {
        if doc.hash.as_deref() != Some(requested) {
            return false;
        }
    }

    match cfg.cache_type {
        CacheType::None => false,
        CacheType::RollingTime => {
            let window_ms = u64::from(cfg.hours) * 3_600_000;
            now_ms.saturating_sub(doc.last_synced_ms) < window_ms
        }
        CacheType::HardTime => doc.last_synced_ms >= today_start_ms,
        CacheType::Auto => now_ms.saturating_sub(doc.last_synced_ms) < 24 * 3_600_000,
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
