use std::sync::Arc;

use trigpointing::cache::{
    CacheInvalidator, CacheNamespace, CacheStore, Invalidator, MemoryCacheStore, MutationKind,
    MutationScope, ResponseCache,
};

fn photo_scope() -> MutationScope {
    MutationScope {
        trig_id: Some(5),
        user_id: Some(9),
        log_id: Some(42),
        photo_id: Some(7),
    }
}

#[tokio::test]
async fn test_environments_sharing_a_store_are_isolated() {
    let store = MemoryCacheStore::new();
    let staging = CacheNamespace::new("trigpointing", "staging").unwrap();
    let production = CacheNamespace::new("trigpointing", "production").unwrap();

    let resources = [
        "trig:5:detail",
        "user:9:logs",
        "log:42:detail",
        "photo:7:detail",
        "logs:list:abc",
        "photos:list:abc",
        "stats:site:summary",
    ];
    for resource in resources {
        store.set(&staging.key(resource), vec![1]).await.unwrap();
        store.set(&production.key(resource), vec![2]).await.unwrap();
    }

    let invalidator = CacheInvalidator::new(Arc::new(store.clone()), staging.clone());
    let removed = invalidator
        .invalidate(MutationKind::Photo, &photo_scope())
        .await
        .unwrap();

    assert_eq!(removed, resources.len() as u64);
    for resource in resources {
        assert!(!store.contains(&staging.key(resource)));
        assert!(store.contains(&production.key(resource)));
    }
}

#[tokio::test]
async fn test_log_event_leaves_other_environment_alone() {
    let store = MemoryCacheStore::new();
    let staging = CacheNamespace::new("trigpointing", "staging").unwrap();
    let production = CacheNamespace::new("trigpointing", "production").unwrap();

    let resources = [
        "trig:5:detail",
        "user:9:logs",
        "log:42:detail",
        "logs:list:abc",
        "trigs:list:abc",
        "stats:site:summary",
    ];
    for resource in resources {
        store.set(&staging.key(resource), vec![1]).await.unwrap();
        store.set(&production.key(resource), vec![2]).await.unwrap();
    }

    let invalidator = CacheInvalidator::new(Arc::new(store.clone()), staging.clone());
    let removed = invalidator
        .invalidate(
            MutationKind::Log,
            &MutationScope {
                photo_id: None,
                ..photo_scope()
            },
        )
        .await
        .unwrap();

    assert_eq!(removed, resources.len() as u64);
    for resource in resources {
        assert!(!store.contains(&staging.key(resource)));
        assert!(store.contains(&production.key(resource)));
    }
}

#[tokio::test]
async fn test_neighbouring_ids_survive() {
    let store = MemoryCacheStore::new();
    let namespace = CacheNamespace::new("trigpointing", "test").unwrap();
    for resource in ["trig:5:detail", "trig:50:detail", "log:42:detail", "log:421:detail"] {
        store.set(&namespace.key(resource), vec![1]).await.unwrap();
    }

    let invalidator = CacheInvalidator::new(Arc::new(store.clone()), namespace.clone());
    invalidator
        .invalidate(MutationKind::Log, &photo_scope())
        .await
        .unwrap();

    assert!(!store.contains(&namespace.key("trig:5:detail")));
    assert!(!store.contains(&namespace.key("log:42:detail")));
    assert!(store.contains(&namespace.key("trig:50:detail")));
    assert!(store.contains(&namespace.key("log:421:detail")));
}

#[tokio::test]
async fn test_unavailable_store_reports_error_and_reads_miss() {
    let store = MemoryCacheStore::new();
    let namespace = CacheNamespace::new("trigpointing", "test").unwrap();
    let responses = ResponseCache::new(Arc::new(store.clone()), namespace.clone());
    responses.put("trig:5:detail", b"{}".to_vec()).await;
    assert_eq!(responses.get("trig:5:detail").await, Some(b"{}".to_vec()));

    store.set_unavailable(true);
    let invalidator = CacheInvalidator::new(Arc::new(store.clone()), namespace);
    assert!(invalidator
        .invalidate(MutationKind::Trig, &photo_scope())
        .await
        .is_err());
    assert_eq!(responses.get("trig:5:detail").await, None);
}

#[test]
fn test_namespace_segments_cannot_overlap() {
    assert!(CacheNamespace::new("trigpointing", "prod:eu").is_err());
    assert!(CacheNamespace::new("trig*", "prod").is_err());
    assert!(CacheNamespace::new("", "prod").is_err());
}
