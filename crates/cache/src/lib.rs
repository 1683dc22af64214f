#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

use std::time::Duration;

use logwarden_core::pipeline::HealthStatus;

pub use config::{BackendKind, BackoffPolicy, CacheConfig};
pub use error::CacheError;
pub use memory::{CacheStats, MemoryCacheStore};
pub use redis_store::RedisCacheStore;
pub use store::CacheStore;

/// 설정으로 선택된 캐시 백엔드
///
/// `CacheStore`는 dyn 호환이 아니므로 런타임 선택은 이 enum으로 위임합니다.
pub enum CacheBackend {
    /// 메모리 저장소
    Memory(MemoryCacheStore),
    /// Redis 저장소
    Redis(RedisCacheStore),
}

impl CacheBackend {
    /// 설정에 따라 백엔드를 생성합니다.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        let backend = match config.backend {
            BackendKind::Memory => Self::Memory(MemoryCacheStore::new(config)),
            BackendKind::Redis => Self::Redis(RedisCacheStore::new(config)?),
        };
        tracing::info!(backend = backend.name(), "cache backend initialized");
        Ok(backend)
    }

    /// 백엔드 이름
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
        }
    }
}

impl CacheStore for CacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self {
            Self::Memory(s) => s.get(key).await,
            Self::Redis(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        match self {
            Self::Memory(s) => s.set(key, value, ttl).await,
            Self::Redis(s) => s.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match self {
            Self::Memory(s) => s.delete(key).await,
            Self::Redis(s) => s.delete(key).await,
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        match self {
            Self::Memory(s) => s.exists(key).await,
            Self::Redis(s) => s.exists(key).await,
        }
    }

    async fn set_with_tags(
        &self,
        key: &str,
        value: &str,
        tags: &[String],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        match self {
            Self::Memory(s) => s.set_with_tags(key, value, tags, ttl).await,
            Self::Redis(s) => s.set_with_tags(key, value, tags, ttl).await,
        }
    }

    async fn invalidate_by_tag(&self, tag: &str) -> Result<usize, CacheError> {
        match self {
            Self::Memory(s) => s.invalidate_by_tag(tag).await,
            Self::Redis(s) => s.invalidate_by_tag(tag).await,
        }
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        match self {
            Self::Memory(s) => s.mget(keys).await,
            Self::Redis(s) => s.mget(keys).await,
        }
    }

    async fn mset(
        &self,
        entries: &[(String, String)],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        match self {
            Self::Memory(s) => s.mset(entries, ttl).await,
            Self::Redis(s) => s.mset(entries, ttl).await,
        }
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        match self {
            Self::Memory(s) => s.increment(key, by).await,
            Self::Redis(s) => s.increment(key, by).await,
        }
    }

    async fn get_counter(&self, key: &str) -> Result<i64, CacheError> {
        match self {
            Self::Memory(s) => s.get_counter(key).await,
            Self::Redis(s) => s.get_counter(key).await,
        }
    }

    async fn health_check(&self) -> HealthStatus {
        match self {
            Self::Memory(s) => s.health_check().await,
            Self::Redis(s) => s.health_check().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_delegates() {
        let backend = CacheBackend::from_config(&CacheConfig::default()).unwrap();
        assert_eq!(backend.name(), "memory");
        backend.set("k", "v", None).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(backend.health_check().await.is_healthy());
    }

    #[test]
    fn redis_backend_builds_without_connecting() {
        let config = CacheConfig {
            backend: BackendKind::Redis,
            redis_url: "redis://127.0.0.1:6379".to_owned(),
            ..CacheConfig::default()
        };
        let backend = CacheBackend::from_config(&config).unwrap();
        assert_eq!(backend.name(), "redis");
    }
}
