use super::*;
use jobtree_core::{CacheType, FakeClock};
use jobtree_storage::fake::FakeDocumentStore;

fn svc(clock: &FakeClock) -> CacheService<FakeDocumentStore, FakeClock> {
    CacheService::new(Arc::new(FakeDocumentStore::new()), clock.clone())
}

fn cfg(cache_type: CacheType, hours: u32) -> CacheConfig {
    CacheConfig { enabled: true, cache_type, hours, revisions: 1 }
}

#[test]
fn fresh_document_within_rolling_window_is_returned() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(10 * 3_600_000);
    let service = svc(&clock);
    service.docs.insert(DocumentRecord {
        jobdef_id: "jd1".into(),
        step_name: "crawl".into(),
        revision: 1,
        content_hash: None,
        last_synced_ms: 9 * 3_600_000,
    });

    let tags = CacheTags::new("jd1", "crawl", 1);
    let found = service.get_fresh_document(&tags, &cfg(CacheType::RollingTime, 24)).unwrap();
    assert!(found.is_some());
}

#[test]
fn stale_document_outside_rolling_window_is_rejected() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(48 * 3_600_000);
    let service = svc(&clock);
    service.docs.insert(DocumentRecord {
        jobdef_id: "jd1".into(),
        step_name: "crawl".into(),
        revision: 1,
        content_hash: None,
        last_synced_ms: 0,
    });

    let tags = CacheTags::new("jd1", "crawl", 1);
    let found = service.get_fresh_document(&tags, &cfg(CacheType::RollingTime, 24)).unwrap();
    assert!(found.is_none());
}

#[test]
fn hash_mismatch_overrides_fresh_time() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_000);
    let service = svc(&clock);
    service.docs.insert(DocumentRecord {
        jobdef_id: "jd1".into(),
        step_name: "crawl".into(),
        revision: 1,
        content_hash: Some("abc".into()),
        last_synced_ms: 0,
    });

    let tags = CacheTags::new("jd1", "crawl", 1).with_hash("different");
    let found = service.get_fresh_document(&tags, &cfg(CacheType::RollingTime, 24)).unwrap();
    assert!(found.is_none());
}

#[test]
fn disabled_cache_never_hits() {
    let clock = FakeClock::new();
    let service = svc(&clock);
    service.docs.insert(DocumentRecord {
        jobdef_id: "jd1".into(),
        step_name: "crawl".into(),
        revision: 1,
        content_hash: None,
        last_synced_ms: 0,
    });

    let tags = CacheTags::new("jd1", "crawl", 1);
    let mut disabled = cfg(CacheType::RollingTime, 24);
    disabled.enabled = false;
    let found = service.get_fresh_document(&tags, &disabled).unwrap();
    assert!(found.is_none());
}

#[test]
fn cleanup_revisions_deletes_over_keep_budget() {
    let clock = FakeClock::new();
    let service = svc(&clock);
    for revision in 1..=3 {
        service.docs.insert(DocumentRecord {
            jobdef_id: "jd1".into(),
            step_name: "crawl".into(),
            revision,
            content_hash: None,
            last_synced_ms: 0,
        });
    }
    service.cleanup_revisions("jd1", "crawl", 1).unwrap();
    assert_eq!(service.get_current_revision("jd1", "crawl").unwrap(), 1);
}

#[test]
fn cleanup_by_jobdef_id_removes_every_step() {
    let clock = FakeClock::new();
    let service = svc(&clock);
    service.docs.insert(DocumentRecord {
        jobdef_id: "jd1".into(),
        step_name: "crawl".into(),
        revision: 1,
        content_hash: None,
        last_synced_ms: 0,
    });
    service.docs.insert(DocumentRecord {
        jobdef_id: "jd1".into(),
        step_name: "summarize".into(),
        revision: 1,
        content_hash: None,
        last_synced_ms: 0,
    });
    service.cleanup_by_jobdef_id("jd1").unwrap();
    assert_eq!(service.get_current_revision("jd1", "crawl").unwrap(), 0);
    assert_eq!(service.get_current_revision("jd1", "summarize").unwrap(), 0);
}

#[test]
fn hard_time_policy_is_fresh_since_midnight_utc() {
    let clock = FakeClock::new();
    let day_ms = 24 * 3_600_000u64;
    clock.set_epoch_ms(day_ms + 3_600_000);
    let service = svc(&clock);
    service.docs.insert(DocumentRecord {
        jobdef_id: "jd1".into(),
        step_name: "crawl".into(),
        revision: 1,
        content_hash: None,
        last_synced_ms: day_ms - 1,
    });
    let tags = CacheTags::new("jd1", "crawl", 1);
    let found = service.get_fresh_document(&tags, &cfg(CacheType::HardTime, 0)).unwrap();
    assert!(found.is_none(), "doc synced before today's midnight should not be fresh");
}
