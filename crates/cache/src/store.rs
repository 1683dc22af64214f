//! 캐시 저장소 trait
//!
//! [`CacheStore`]는 분류 파이프라인이 의존하는 유일한 공유 가변 자원입니다.
//! 값은 문자열로 저장하며, 구조화된 값은 [`CacheStore::get_json`] /
//! [`CacheStore::set_json`]으로 JSON 직렬화하여 다룹니다.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use logwarden_core::pipeline::HealthStatus;

use crate::error::CacheError;

/// TTL/태그 기반 키-값 캐시
///
/// 모든 연산은 동시에 호출될 수 있어야 합니다.
/// `ttl`이 `None`이면 구현체의 기본 TTL을 사용합니다.
pub trait CacheStore: Send + Sync + 'static {
    /// 키의 값을 조회합니다. 만료되었거나 없으면 `None`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, CacheError>> + Send;

    /// 값을 저장합니다. 기존 값과 만료 시각을 덮어씁니다.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// 키를 삭제합니다. 삭제된 키가 있었으면 `true`.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// 키가 존재하는지 확인합니다.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// 태그와 함께 값을 저장합니다.
    fn set_with_tags(
        &self,
        key: &str,
        value: &str,
        tags: &[String],
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// 태그가 붙은 모든 키를 삭제하고 삭제한 키 수를 반환합니다.
    fn invalidate_by_tag(&self, tag: &str)
    -> impl Future<Output = Result<usize, CacheError>> + Send;

    /// 여러 키를 한 번에 조회합니다. 결과 순서는 입력 순서와 같습니다.
    fn mget(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<Vec<Option<String>>, CacheError>> + Send;

    /// 여러 키를 한 번에 저장합니다.
    fn mset(
        &self,
        entries: &[(String, String)],
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// 정수 카운터를 `by`만큼 증가시키고 새 값을 반환합니다. 없으면 0에서 시작합니다.
    fn increment(&self, key: &str, by: i64)
    -> impl Future<Output = Result<i64, CacheError>> + Send;

    /// 정수 카운터 값을 조회합니다. 없으면 0.
    fn get_counter(&self, key: &str) -> impl Future<Output = Result<i64, CacheError>> + Send;

    /// 백엔드 상태를 점검합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;

    /// JSON으로 저장된 값을 역직렬화하여 조회합니다.
    fn get_json<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<T>, CacheError>> + Send {
        async move {
            match self.get(key).await? {
                Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok(None),
            }
        }
    }

    /// 값을 JSON으로 직렬화하여 저장합니다.
    fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), CacheError>> + Send {
        let encoded = serde_json::to_string(value);
        async move {
            let encoded = encoded?;
            self.set(key, &encoded, ttl).await
        }
    }
}
