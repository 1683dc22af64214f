//! 분류 파이프라인 에러 타입
//!
//! [`ClassifierError`]는 규칙 로딩/검증, provider 호출, 문서 저장소 갱신 중 발생하는
//! 에러를 표현합니다. `analyze()`는 이 에러를 호출자에게 전달하지 않고
//! 내부에서 폴백 처리하며, 규칙 관리와 빌드 단계에서만 에러가 노출됩니다.

use logwarden_cache::CacheError;
use logwarden_core::error::LogwardenError;

/// 분류 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// 규칙 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 규칙 유효성 검증 실패 (잘못된 정규식 포함)
    #[error("rule validation error: rule '{rule_id}': {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 ID
        rule_id: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 분석 provider 호출 실패
    #[error("analysis provider error: {0}")]
    Provider(String),

    /// 문서 저장소 갱신 실패
    #[error("log store error: {0}")]
    Store(String),

    /// HTTP 전송 실패
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// 캐시 에러
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<ClassifierError> for LogwardenError {
    fn from(err: ClassifierError) -> Self {
        LogwardenError::Classification(err.to_string())
    }
}
