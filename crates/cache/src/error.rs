//! 캐시 에러 타입
//!
//! [`CacheError`]는 캐시 백엔드에서 발생하는 모든 에러를 표현합니다.
//! 호출자(분류 파이프라인)는 캐시 에러를 미스로 취급하므로 대부분 로그로만 남습니다.

use logwarden_core::error::LogwardenError;

/// 캐시 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// 백엔드 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 재연결 backoff 중이라 요청을 보내지 않음
    #[error("backend unavailable, next reconnect attempt in {retry_in_ms}ms")]
    Unavailable {
        /// 다음 재연결 시도까지 남은 시간 (밀리초)
        retry_in_ms: u64,
    },

    /// 백엔드 명령 실패
    #[error("backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// 저장된 값이 정수 카운터가 아님
    #[error("value at '{key}' is not an integer counter")]
    NotACounter {
        /// 대상 키
        key: String,
    },

    /// 직렬화/역직렬화 실패
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<CacheError> for LogwardenError {
    fn from(err: CacheError) -> Self {
        LogwardenError::Cache(err.to_string())
    }
}
