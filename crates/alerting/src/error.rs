//! 알림 엔진 에러 타입

use logwarden_core::error::{LogwardenError, PipelineError};

/// 알림 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum AlertingError {
    /// 규칙 파일 로드 실패
    #[error("failed to load alert rule from '{path}': {reason}")]
    RuleLoad {
        /// 파일 또는 디렉토리 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 유효하지 않은 규칙
    #[error("invalid alert rule '{rule_id}': {reason}")]
    RuleValidation {
        /// 규칙 ID
        rule_id: String,
        /// 실패 사유
        reason: String,
    },

    /// 같은 ID의 규칙이 이미 있음
    #[error("alert rule already exists: {0}")]
    DuplicateRule(String),

    /// 규칙을 찾을 수 없음
    #[error("alert rule not found: {0}")]
    RuleNotFound(String),

    /// 알림 액션 실행 실패
    #[error("{action} action failed: {reason}")]
    Action {
        /// 액션 종류
        action: String,
        /// 실패 사유
        reason: String,
    },

    /// 메트릭 조회 실패
    #[error("metric source error: {0}")]
    MetricSource(String),

    /// 이미 실행 중
    #[error("alert engine already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("alert engine not running")]
    NotRunning,

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<AlertingError> for LogwardenError {
    fn from(err: AlertingError) -> Self {
        match err {
            AlertingError::AlreadyRunning => PipelineError::AlreadyRunning.into(),
            AlertingError::NotRunning => PipelineError::NotRunning.into(),
            other => LogwardenError::Alerting(other.to_string()),
        }
    }
}
