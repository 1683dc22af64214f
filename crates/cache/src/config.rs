//! 캐시 설정
//!
//! core의 [`CacheSection`](logwarden_core::config::CacheSection)에서 런타임 설정을 만듭니다.

use std::time::Duration;

use logwarden_core::config::CacheSection;

use crate::error::CacheError;

/// 캐시 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// 프로세스 내 메모리
    Memory,
    /// Redis
    Redis,
}

/// 캐시 런타임 설정
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 백엔드 종류
    pub backend: BackendKind,
    /// Redis 연결 문자열
    pub redis_url: String,
    /// 키 접두어
    pub key_prefix: String,
    /// 기본 TTL (None이면 만료 없음)
    pub default_ttl: Option<Duration>,
    /// 메모리 백엔드 최대 엔트리 수
    pub max_entries: usize,
    /// 재연결 backoff 정책
    pub backoff: BackoffPolicy,
}

impl CacheConfig {
    /// core 설정 섹션에서 런타임 설정을 생성합니다.
    pub fn from_core(section: &CacheSection) -> Result<Self, CacheError> {
        let backend = match section.backend.as_str() {
            "memory" => BackendKind::Memory,
            "redis" => BackendKind::Redis,
            other => {
                return Err(CacheError::Config {
                    field: "backend".to_owned(),
                    reason: format!("unknown backend '{other}'"),
                });
            }
        };

        let config = Self {
            backend,
            redis_url: section.redis_url.clone(),
            key_prefix: section.key_prefix.clone(),
            default_ttl: (section.default_ttl_secs > 0)
                .then(|| Duration::from_secs(section.default_ttl_secs)),
            max_entries: section.max_entries,
            backoff: BackoffPolicy {
                base: Duration::from_millis(section.reconnect_base_delay_ms),
                max: Duration::from_millis(section.reconnect_max_delay_ms),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_entries == 0 {
            return Err(CacheError::Config {
                field: "max_entries".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.backend == BackendKind::Redis && self.redis_url.is_empty() {
            return Err(CacheError::Config {
                field: "redis_url".to_owned(),
                reason: "must not be empty for the redis backend".to_owned(),
            });
        }
        if self.backoff.base.is_zero() || self.backoff.base > self.backoff.max {
            return Err(CacheError::Config {
                field: "reconnect_base_delay_ms".to_owned(),
                reason: "must be greater than 0 and not exceed reconnect_max_delay_ms".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            redis_url: String::new(),
            key_prefix: String::new(),
            default_ttl: Some(Duration::from_secs(3600)),
            max_entries: 100_000,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// 지수 재연결 backoff
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// 첫 재시도 대기 시간
    pub base: Duration,
    /// 최대 대기 시간
    pub max: Duration,
}

impl BackoffPolicy {
    /// `attempts`번 연속 실패한 뒤의 대기 시간을 계산합니다.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << exp).min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}
