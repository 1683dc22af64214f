//! 동시 접근 통합 테스트

use std::sync::Arc;
use std::time::Duration;

use logwarden_cache::{CacheBackend, CacheConfig, CacheStore, MemoryCacheStore};

#[tokio::test]
async fn concurrent_increments_are_not_lost() {
    let cache = Arc::new(MemoryCacheStore::with_limits(None, 1000));
    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for _ in 0..50 {
                cache.increment("processed", 1).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(cache.get_counter("processed").await.unwrap(), 800);
}

#[tokio::test]
async fn concurrent_writers_and_tag_invalidation() {
    let cache = Arc::new(CacheBackend::from_config(&CacheConfig::default()).unwrap());
    let mut handles = Vec::new();
    for i in 0..20 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            let tags = vec![format!("group:{}", i % 2)];
            cache
                .set_with_tags(&format!("key:{i}"), "value", &tags, None)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cache.invalidate_by_tag("group:0").await.unwrap(), 10);
    let keys: Vec<String> = (0..20).map(|i| format!("key:{i}")).collect();
    let values = cache.mget(&keys).await.unwrap();
    for (i, value) in values.iter().enumerate() {
        assert_eq!(value.is_some(), i % 2 == 1, "key:{i}");
    }
}

#[tokio::test(start_paused = true)]
async fn overwrite_resets_insertion_time() {
    let cache = MemoryCacheStore::with_limits(None, 10);
    cache
        .set("k", "old", Some(Duration::from_secs(1)))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_millis(800)).await;
    cache
        .set("k", "new", Some(Duration::from_secs(1)))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_millis(800)).await;
    assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("new"));
}
