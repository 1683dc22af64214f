//! 메모리 캐시 저장소
//!
//! [`MemoryCacheStore`]는 프로세스 내부 `HashMap`에 엔트리를 보관합니다.
//! 만료 시각은 삽입 시점에 `tokio::time::Instant`로 계산하므로
//! 테스트에서 `tokio::time::pause`/`advance`로 시간을 제어할 수 있습니다.
//!
//! 만료된 엔트리는 접근 시 지연 삭제되며, 최대 엔트리 수에 도달하면
//! 만료 엔트리를 먼저 정리한 뒤 가장 오래된 엔트리를 내보냅니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use logwarden_core::pipeline::HealthStatus;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::store::CacheStore;

/// 캐시 엔트리
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    inserted_at: Instant,
    expires_at: Option<Instant>,
    tags: HashSet<String>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// 잠금으로 보호되는 내부 상태
#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// 태그 -> 키 집합
    tag_index: HashMap<String, HashSet<String>>,
}

impl Inner {
    /// 키를 제거하고 태그 인덱스를 정리합니다.
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        for tag in &entry.tags {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
        Some(entry)
    }

    /// 만료되지 않은 엔트리를 반환합니다. 만료된 엔트리는 제거합니다.
    fn live(&mut self, key: &str, now: Instant) -> Option<&Entry> {
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.remove(key);
            return None;
        }
        self.entries.get(key)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn insert(&mut self, key: &str, entry: Entry, max_entries: usize, now: Instant) {
        self.remove(key);

        if self.entries.len() >= max_entries {
            self.purge_expired(now);
        }
        if self.entries.len() >= max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                tracing::debug!(key = %oldest, "cache full, evicting oldest entry");
                self.remove(&oldest);
            }
        }

        for tag in &entry.tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_owned());
        }
        self.entries.insert(key.to_owned(), entry);
    }
}

/// 캐시 통계
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// 적중 수
    pub hits: u64,
    /// 미스 수
    pub misses: u64,
    /// 현재 엔트리 수 (만료 대기 엔트리 포함)
    pub entries: usize,
}

impl CacheStats {
    /// 적중률 (조회가 없으면 0.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 메모리 캐시 저장소
///
/// `Clone`은 같은 저장소를 공유합니다.
#[derive(Debug, Clone)]
pub struct MemoryCacheStore {
    inner: Arc<Mutex<Inner>>,
    default_ttl: Option<Duration>,
    max_entries: usize,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl MemoryCacheStore {
    /// 설정에서 저장소를 생성합니다.
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_limits(config.default_ttl, config.max_entries)
    }

    /// 기본 TTL과 최대 엔트리 수를 지정하여 생성합니다.
    pub fn with_limits(default_ttl: Option<Duration>, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            default_ttl,
            max_entries: max_entries.max(1),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 만료된 엔트리를 모두 제거하고 제거한 수를 반환합니다.
    pub async fn purge_expired(&self) -> usize {
        self.inner.lock().await.purge_expired(Instant::now())
    }

    /// 현재 통계를 반환합니다.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.inner.lock().await.entries.len(),
        }
    }

    fn make_entry(&self, value: &str, tags: &[String], ttl: Option<Duration>) -> Entry {
        let now = Instant::now();
        Entry {
            value: value.to_owned(),
            inserted_at: now,
            expires_at: ttl.or(self.default_ttl).map(|ttl| now + ttl),
            tags: tags.iter().cloned().collect(),
        }
    }

    fn record_lookup(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut inner = self.inner.lock().await;
        let value = inner.live(key, Instant::now()).map(|e| e.value.clone());
        self.record_lookup(value.is_some());
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let entry = self.make_entry(value, &[], ttl);
        let mut inner = self.inner.lock().await;
        inner.insert(key, entry, self.max_entries, Instant::now());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        Ok(inner.remove(key).is_some_and(|e| !e.is_expired(now)))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.live(key, Instant::now()).is_some())
    }

    async fn set_with_tags(
        &self,
        key: &str,
        value: &str,
        tags: &[String],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let entry = self.make_entry(value, tags, ttl);
        let mut inner = self.inner.lock().await;
        inner.insert(key, entry, self.max_entries, Instant::now());
        Ok(())
    }

    async fn invalidate_by_tag(&self, tag: &str) -> Result<usize, CacheError> {
        let mut inner = self.inner.lock().await;
        let keys: Vec<String> = inner
            .tag_index
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        for key in &keys {
            inner.remove(key);
        }
        tracing::debug!(tag, count = keys.len(), "invalidated cache entries by tag");
        Ok(keys.len())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let values: Vec<Option<String>> = keys
            .iter()
            .map(|key| inner.live(key, now).map(|e| e.value.clone()))
            .collect();
        for value in &values {
            self.record_lookup(value.is_some());
        }
        Ok(values)
    }

    async fn mset(
        &self,
        entries: &[(String, String)],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().await;
        for (key, value) in entries {
            let entry = self.make_entry(value, &[], ttl);
            inner.insert(key, entry, self.max_entries, Instant::now());
        }
        Ok(())
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let (current, expires_at, tags) = match inner.live(key, now) {
            Some(entry) => {
                let current = entry
                    .value
                    .parse::<i64>()
                    .map_err(|_| CacheError::NotACounter {
                        key: key.to_owned(),
                    })?;
                (current, entry.expires_at, entry.tags.clone())
            }
            None => (0, None, HashSet::new()),
        };

        let next = current.saturating_add(by);
        // 카운터는 만료 시각을 유지하고 기본 TTL을 적용하지 않음
        let entry = Entry {
            value: next.to_string(),
            inserted_at: now,
            expires_at,
            tags,
        };
        inner.insert(key, entry, self.max_entries, now);
        Ok(next)
    }

    async fn get_counter(&self, key: &str) -> Result<i64, CacheError> {
        let mut inner = self.inner.lock().await;
        match inner.live(key, Instant::now()) {
            Some(entry) => entry
                .value
                .parse::<i64>()
                .map_err(|_| CacheError::NotACounter {
                    key: key.to_owned(),
                }),
            None => Ok(0),
        }
    }

    async fn health_check(&self) -> HealthStatus {
        let len = self.inner.lock().await.entries.len();
        if len >= self.max_entries {
            HealthStatus::Degraded(format!("cache at capacity ({len} entries)"))
        } else {
            HealthStatus::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryCacheStore {
        MemoryCacheStore::with_limits(None, 100)
    }

    #[tokio::test]
    async fn set_then_get() {
        let cache = store();
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let cache = store();
        assert_eq!(cache.get("nope").await.unwrap(), None);
        assert!(!cache.exists("nope").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl_from_insertion() {
        let cache = store();
        cache
            .set("k", "v", Some(Duration::from_secs(1)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_extend_ttl() {
        let cache = store();
        cache
            .set("k", "v", Some(Duration::from_secs(2)))
            .await
            .unwrap();
        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(600)).await;
            let _ = cache.get("k").await.unwrap();
        }
        // 1.8s 경과: 아직 유효
        assert!(cache.exists("k").await.unwrap());
        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn default_ttl_applies_when_unspecified() {
        let cache = MemoryCacheStore::with_limits(Some(Duration::from_secs(5)), 10);
        cache.set("k", "v", None).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let cache = store();
        cache.set("k", "v", None).await.unwrap();
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn invalidate_by_tag_removes_only_tagged_keys() {
        let cache = store();
        let tags = vec!["log:1".to_owned()];
        cache.set_with_tags("a", "1", &tags, None).await.unwrap();
        cache.set_with_tags("b", "2", &tags, None).await.unwrap();
        cache.set("c", "3", None).await.unwrap();

        assert_eq!(cache.invalidate_by_tag("log:1").await.unwrap(), 2);
        assert!(!cache.exists("a").await.unwrap());
        assert!(!cache.exists("b").await.unwrap());
        assert!(cache.exists("c").await.unwrap());
        assert_eq!(cache.invalidate_by_tag("log:1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn overwrite_drops_old_tags() {
        let cache = store();
        cache
            .set_with_tags("a", "1", &["old".to_owned()], None)
            .await
            .unwrap();
        cache.set("a", "2", None).await.unwrap();
        assert_eq!(cache.invalidate_by_tag("old").await.unwrap(), 0);
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn mget_preserves_order() {
        let cache = store();
        cache
            .mset(
                &[
                    ("x".to_owned(), "1".to_owned()),
                    ("z".to_owned(), "3".to_owned()),
                ],
                None,
            )
            .await
            .unwrap();
        let values = cache
            .mget(&["x".to_owned(), "y".to_owned(), "z".to_owned()])
            .await
            .unwrap();
        assert_eq!(
            values,
            vec![Some("1".to_owned()), None, Some("3".to_owned())]
        );
    }

    #[tokio::test]
    async fn counters_start_at_zero() {
        let cache = store();
        assert_eq!(cache.get_counter("hits").await.unwrap(), 0);
        assert_eq!(cache.increment("hits", 1).await.unwrap(), 1);
        assert_eq!(cache.increment("hits", 5).await.unwrap(), 6);
        assert_eq!(cache.increment("hits", -2).await.unwrap(), 4);
        assert_eq!(cache.get_counter("hits").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn increment_non_integer_fails() {
        let cache = store();
        cache.set("text", "hello", None).await.unwrap();
        let err = cache.increment("text", 1).await.unwrap_err();
        assert!(matches!(err, CacheError::NotACounter { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_evicts_oldest() {
        let cache = MemoryCacheStore::with_limits(None, 2);
        cache.set("first", "1", None).await.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("second", "2", None).await.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("third", "3", None).await.unwrap();

        assert!(!cache.exists("first").await.unwrap());
        assert!(cache.exists("second").await.unwrap());
        assert!(cache.exists("third").await.unwrap());
    }

    #[tokio::test]
    async fn json_helpers_roundtrip_struct() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Sample {
            name: String,
            score: f64,
        }
        let cache = store();
        let value = Sample {
            name: "db".to_owned(),
            score: 0.5,
        };
        cache.set_json("s", &value, None).await.unwrap();
        let loaded: Option<Sample> = cache.get_json("s").await.unwrap();
        assert_eq!(loaded, Some(value));
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() {
        let cache = store();
        cache.set("k", "v", None).await.unwrap();
        let _ = cache.get("k").await.unwrap();
        let _ = cache.get("missing").await.unwrap();
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn health_degrades_at_capacity() {
        let cache = MemoryCacheStore::with_limits(None, 1);
        assert!(cache.health_check().await.is_healthy());
        cache.set("k", "v", None).await.unwrap();
        assert!(cache.health_check().await.is_degraded());
    }
}
