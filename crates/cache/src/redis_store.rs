//! Redis 캐시 저장소
//!
//! [`RedisCacheStore`]는 연결 상태와 재연결 backoff를 내부에서 관리합니다.
//! 첫 연산 시점에 연결하며, 연결이 끊기면 다음 연산에서 backoff 정책에 따라
//! 재연결을 시도합니다. backoff 대기 중인 연산은 백엔드에 요청하지 않고
//! [`CacheError::Unavailable`]로 즉시 실패합니다.
//!
//! 태그는 `{prefix}tag:{tag}` Redis set에 키 목록으로 저장되고, 키마다
//! `{prefix}tags-of:{full_key}` set에 속한 태그 목록을 역으로 보관합니다.
//! 쓰기/삭제/태그 무효화는 Lua 스크립트로 두 인덱스를 원자적으로 갱신합니다.
//! 태그 set의 만료 시각은 소속 엔트리 중 가장 늦은 만료 시각 이상으로 유지되므로,
//! 엔트리가 모두 만료되면 태그 set도 함께 사라집니다.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{Script, ScriptInvocation};
use tokio::sync::Mutex;
use tokio::time::Instant;

use logwarden_core::metrics as m;
use logwarden_core::pipeline::HealthStatus;

use crate::config::{BackoffPolicy, CacheConfig};
use crate::error::CacheError;
use crate::store::CacheStore;

/// 값 쓰기: 이전 태그에서 키를 빼고, 값을 쓰고, 새 태그를 등록합니다.
///
/// KEYS[1] 값 키, KEYS[2] 키의 태그 목록, KEYS[3..] 태그 set.
/// ARGV[1] 값, ARGV[2] TTL(ms, 0이면 만료 없음).
const SET_SCRIPT: &str = r"
local ttl = tonumber(ARGV[2])
for _, tag in ipairs(redis.call('SMEMBERS', KEYS[2])) do
  redis.call('SREM', tag, KEYS[1])
end
redis.call('DEL', KEYS[2])
if ttl > 0 then
  redis.call('SET', KEYS[1], ARGV[1], 'PX', ttl)
else
  redis.call('SET', KEYS[1], ARGV[1])
end
for i = 3, #KEYS do
  local current = redis.call('PTTL', KEYS[i])
  redis.call('SADD', KEYS[i], KEYS[1])
  redis.call('SADD', KEYS[2], KEYS[i])
  if ttl == 0 then
    redis.call('PERSIST', KEYS[i])
  elseif current == -2 or (current >= 0 and current < ttl) then
    redis.call('PEXPIRE', KEYS[i], ttl)
  end
end
if #KEYS > 2 and ttl > 0 then
  redis.call('PEXPIRE', KEYS[2], ttl)
end
return 1
";

/// 키 삭제: 태그 set에서 키를 빼고 태그 목록과 값을 지웁니다.
///
/// KEYS[1] 값 키, KEYS[2] 키의 태그 목록. 삭제된 값 키 수를 반환합니다.
const DELETE_SCRIPT: &str = r"
for _, tag in ipairs(redis.call('SMEMBERS', KEYS[2])) do
  redis.call('SREM', tag, KEYS[1])
end
redis.call('DEL', KEYS[2])
return redis.call('DEL', KEYS[1])
";

/// 태그 무효화: 태그의 모든 키와 그 키들의 다른 태그 소속을 지웁니다.
///
/// KEYS[1] 태그 set, ARGV[1] 태그 목록 키 접두사. 삭제된 값 키 수를 반환합니다.
const INVALIDATE_SCRIPT: &str = r"
local deleted = 0
for _, key in ipairs(redis.call('SMEMBERS', KEYS[1])) do
  local index = ARGV[1] .. key
  for _, tag in ipairs(redis.call('SMEMBERS', index)) do
    if tag ~= KEYS[1] then
      redis.call('SREM', tag, key)
    end
  end
  redis.call('DEL', index)
  deleted = deleted + redis.call('DEL', key)
end
redis.call('DEL', KEYS[1])
return deleted
";

/// 연결 상태
enum ConnectionState {
    /// 연결 안 됨. `next_retry_at` 이전에는 재시도하지 않음
    Disconnected {
        attempts: u32,
        next_retry_at: Option<Instant>,
    },
    /// 연결됨. `ConnectionManager`는 clone하여 사용
    Connected(ConnectionManager),
}

/// Redis 캐시 저장소
pub struct RedisCacheStore {
    client: redis::Client,
    key_prefix: String,
    default_ttl: Option<Duration>,
    backoff: BackoffPolicy,
    state: Mutex<ConnectionState>,
    set_script: Script,
    delete_script: Script,
    invalidate_script: Script,
}

impl RedisCacheStore {
    /// 설정에서 저장소를 생성합니다. 연결은 첫 연산 시점에 맺습니다.
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| CacheError::Connection(format!("invalid redis url: {e}")))?;

        Ok(Self {
            client,
            key_prefix: config.key_prefix.clone(),
            default_ttl: config.default_ttl,
            backoff: config.backoff,
            state: Mutex::new(ConnectionState::Disconnected {
                attempts: 0,
                next_retry_at: None,
            }),
            set_script: Script::new(SET_SCRIPT),
            delete_script: Script::new(DELETE_SCRIPT),
            invalidate_script: Script::new(INVALIDATE_SCRIPT),
        })
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn tag_key(&self, tag: &str) -> String {
        format!("{}tag:{}", self.key_prefix, tag)
    }

    fn index_prefix(&self) -> String {
        format!("{}tags-of:", self.key_prefix)
    }

    /// `full_key`가 속한 태그 목록 키
    fn index_key(&self, full_key: &str) -> String {
        format!("{}{}", self.index_prefix(), full_key)
    }

    /// 엔트리 TTL(ms). 0은 만료 없음이며, 1ms 미만은 1ms로 올림합니다.
    fn ttl_millis(&self, ttl: Option<Duration>) -> u64 {
        ttl.or(self.default_ttl)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1))
            .unwrap_or(0)
    }

    fn set_invocation(
        &self,
        key: &str,
        value: &str,
        tags: &[String],
        ttl: Option<Duration>,
    ) -> ScriptInvocation<'_> {
        let full_key = self.build_key(key);
        let mut invocation = self.set_script.prepare_invoke();
        invocation.key(&full_key).key(self.index_key(&full_key));
        for tag in tags {
            invocation.key(self.tag_key(tag));
        }
        invocation.arg(value).arg(self.ttl_millis(ttl));
        invocation
    }

    /// 연결을 가져옵니다. 필요하면 backoff 정책에 따라 재연결합니다.
    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let mut state = self.state.lock().await;

        let attempts = match &*state {
            ConnectionState::Connected(conn) => return Ok(conn.clone()),
            ConnectionState::Disconnected {
                attempts,
                next_retry_at,
            } => {
                if let Some(at) = next_retry_at
                    && let Some(remaining) = at.checked_duration_since(Instant::now())
                    && !remaining.is_zero()
                {
                    return Err(CacheError::Unavailable {
                        retry_in_ms: remaining.as_millis() as u64,
                    });
                }
                *attempts
            }
        };

        metrics::counter!(m::CACHE_RECONNECT_ATTEMPTS_TOTAL).increment(1);
        match self.client.get_connection_manager().await {
            Ok(conn) => {
                if attempts > 0 {
                    tracing::info!(attempts, "redis cache reconnected");
                } else {
                    tracing::debug!("redis cache connected");
                }
                *state = ConnectionState::Connected(conn.clone());
                Ok(conn)
            }
            Err(e) => {
                let attempts = attempts + 1;
                let delay = self.backoff.delay_for(attempts);
                tracing::warn!(
                    attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "redis cache connection failed"
                );
                *state = ConnectionState::Disconnected {
                    attempts,
                    next_retry_at: Some(Instant::now() + delay),
                };
                Err(CacheError::Connection(e.to_string()))
            }
        }
    }

    /// 명령 실패를 기록하고, 연결 문제면 상태를 끊김으로 전환합니다.
    async fn on_error(&self, operation: &'static str, err: redis::RedisError) -> CacheError {
        metrics::counter!(m::CACHE_ERRORS_TOTAL, m::LABEL_OPERATION => operation).increment(1);
        tracing::warn!(operation, error = %err, "redis cache command failed");

        if err.is_connection_dropped() || err.is_io_error() || err.is_timeout() {
            let mut state = self.state.lock().await;
            if matches!(&*state, ConnectionState::Connected(_)) {
                *state = ConnectionState::Disconnected {
                    attempts: 1,
                    next_retry_at: Some(Instant::now() + self.backoff.delay_for(1)),
                };
            }
        }
        CacheError::Backend(err)
    }
}

impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let result: Result<Option<String>, _> = redis::cmd("GET")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await;
        match result {
            Ok(value) => Ok(value),
            Err(e) => Err(self.on_error("get", e).await),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let result: Result<i64, _> = self
            .set_invocation(key, value, &[], ttl)
            .invoke_async(&mut conn)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(self.on_error("set", e).await),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let full_key = self.build_key(key);
        let result: Result<i64, _> = self
            .delete_script
            .key(&full_key)
            .key(self.index_key(&full_key))
            .invoke_async(&mut conn)
            .await;
        match result {
            Ok(count) => Ok(count > 0),
            Err(e) => Err(self.on_error("delete", e).await),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let result: Result<i64, _> = redis::cmd("EXISTS")
            .arg(self.build_key(key))
            .query_async(&mut conn)
            .await;
        match result {
            Ok(count) => Ok(count > 0),
            Err(e) => Err(self.on_error("exists", e).await),
        }
    }

    async fn set_with_tags(
        &self,
        key: &str,
        value: &str,
        tags: &[String],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let result: Result<i64, _> = self
            .set_invocation(key, value, tags, ttl)
            .invoke_async(&mut conn)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(self.on_error("set_with_tags", e).await),
        }
    }

    async fn invalidate_by_tag(&self, tag: &str) -> Result<usize, CacheError> {
        let mut conn = self.connection().await?;
        let result: Result<i64, _> = self
            .invalidate_script
            .key(self.tag_key(tag))
            .arg(self.index_prefix())
            .invoke_async(&mut conn)
            .await;
        match result {
            Ok(count) => {
                let deleted = count.max(0) as usize;
                tracing::debug!(tag, count = deleted, "invalidated cache entries by tag");
                Ok(deleted)
            }
            Err(e) => Err(self.on_error("invalidate_by_tag", e).await),
        }
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let full_keys: Vec<String> = keys.iter().map(|k| self.build_key(k)).collect();
        let result: Result<Vec<Option<String>>, _> = redis::cmd("MGET")
            .arg(&full_keys)
            .query_async(&mut conn)
            .await;
        match result {
            Ok(values) => Ok(values),
            Err(e) => Err(self.on_error("mget", e).await),
        }
    }

    async fn mset(
        &self,
        entries: &[(String, String)],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;

        // 파이프라인의 EVALSHA는 스크립트를 자동으로 적재하지 않음
        if let Err(e) = self.set_script.load_async(&mut conn).await {
            return Err(self.on_error("mset", e).await);
        }
        let invocations: Vec<ScriptInvocation<'_>> = entries
            .iter()
            .map(|(key, value)| self.set_invocation(key, value, &[], ttl))
            .collect();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for invocation in &invocations {
            pipe.invoke_script(invocation).ignore();
        }
        let result: Result<(), _> = pipe.query_async(&mut conn).await;
        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.on_error("mset", e).await),
        }
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        let mut conn = self.connection().await?;
        let result: Result<i64, redis::RedisError> = redis::cmd("INCRBY")
            .arg(self.build_key(key))
            .arg(by)
            .query_async(&mut conn)
            .await;
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.kind() == redis::ErrorKind::ResponseError => {
                Err(CacheError::NotACounter {
                    key: key.to_owned(),
                })
            }
            Err(e) => Err(self.on_error("increment", e).await),
        }
    }

    async fn get_counter(&self, key: &str) -> Result<i64, CacheError> {
        match self.get(key).await? {
            Some(raw) => raw.parse::<i64>().map_err(|_| CacheError::NotACounter {
                key: key.to_owned(),
            }),
            None => Ok(0),
        }
    }

    async fn health_check(&self) -> HealthStatus {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => return HealthStatus::Unhealthy(format!("redis unavailable: {e}")),
        };
        let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        match result {
            Ok(pong) if pong == "PONG" => HealthStatus::Healthy,
            Ok(other) => HealthStatus::Degraded(format!("unexpected PING reply: {other}")),
            Err(e) => {
                let err = self.on_error("ping", e).await;
                HealthStatus::Unhealthy(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;

    fn config(url: &str) -> CacheConfig {
        CacheConfig {
            backend: BackendKind::Redis,
            redis_url: url.to_owned(),
            key_prefix: "test:".to_owned(),
            default_ttl: Some(Duration::from_secs(60)),
            max_entries: 10,
            backoff: BackoffPolicy {
                base: Duration::from_secs(5),
                max: Duration::from_secs(60),
            },
        }
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(RedisCacheStore::new(&config("not a url")).is_err());
    }

    #[test]
    fn keys_are_prefixed() {
        let store = RedisCacheStore::new(&config("redis://127.0.0.1:1")).unwrap();
        assert_eq!(store.build_key("analysis:1"), "test:analysis:1");
        assert_eq!(store.tag_key("log:1"), "test:tag:log:1");
    }

    #[test]
    fn tag_index_key_wraps_full_key() {
        let store = RedisCacheStore::new(&config("redis://127.0.0.1:1")).unwrap();
        let full_key = store.build_key("analysis:1");
        assert_eq!(store.index_key(&full_key), "test:tags-of:test:analysis:1");
    }

    #[test]
    fn ttl_keeps_millisecond_precision() {
        let store = RedisCacheStore::new(&config("redis://127.0.0.1:1")).unwrap();
        assert_eq!(store.ttl_millis(None), 60_000);
        assert_eq!(store.ttl_millis(Some(Duration::from_millis(10))), 10);
        assert_eq!(store.ttl_millis(Some(Duration::from_millis(1500))), 1500);
        assert_eq!(store.ttl_millis(Some(Duration::from_micros(10))), 1);
    }

    #[test]
    fn ttl_zero_means_no_expiry_without_default() {
        let mut cfg = config("redis://127.0.0.1:1");
        cfg.default_ttl = None;
        let store = RedisCacheStore::new(&cfg).unwrap();
        assert_eq!(store.ttl_millis(None), 0);
    }

    #[tokio::test]
    async fn backoff_short_circuits_without_contacting_backend() {
        let store = RedisCacheStore::new(&config("redis://127.0.0.1:1")).unwrap();
        *store.state.lock().await = ConnectionState::Disconnected {
            attempts: 3,
            next_retry_at: Some(Instant::now() + Duration::from_secs(30)),
        };

        let err = store.get("k").await.unwrap_err();
        match err {
            CacheError::Unavailable { retry_in_ms } => assert!(retry_in_ms > 0),
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert!(store.health_check().await.is_unhealthy());
    }
}
