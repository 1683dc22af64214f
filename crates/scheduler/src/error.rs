//! 스케줄러 에러 타입
//!
//! 핸들러 실패는 에러가 아니라 `success = false`인 [`WorkerResult`](crate::WorkerResult)로
//! 전달됩니다. 여기의 에러는 스케줄러 자체의 사용 오류와 설정 오류입니다.

use logwarden_core::error::{LogwardenError, PipelineError};

/// 스케줄러 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// 종료가 시작되어 새 작업을 받지 않음
    #[error("scheduler is shutting down, task rejected")]
    ShuttingDown,

    /// 이미 시작됨
    #[error("scheduler already started")]
    AlreadyStarted,

    /// 아직 시작하지 않음
    #[error("scheduler not started")]
    NotStarted,

    /// control 태스크와의 통신 실패
    #[error("channel error: {0}")]
    Channel(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<SchedulerError> for LogwardenError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::AlreadyStarted => PipelineError::AlreadyRunning.into(),
            SchedulerError::NotStarted => PipelineError::NotRunning.into(),
            other => LogwardenError::Scheduler(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_map_to_pipeline_errors() {
        let err: LogwardenError = SchedulerError::AlreadyStarted.into();
        assert!(matches!(
            err,
            LogwardenError::Pipeline(PipelineError::AlreadyRunning)
        ));
        let err: LogwardenError = SchedulerError::NotStarted.into();
        assert!(matches!(
            err,
            LogwardenError::Pipeline(PipelineError::NotRunning)
        ));
    }

    #[test]
    fn config_error_display() {
        let err = SchedulerError::Config {
            field: "pool_size".to_owned(),
            reason: "must be greater than 0".to_owned(),
        };
        assert!(err.to_string().contains("pool_size"));
        let top: LogwardenError = err.into();
        assert!(matches!(top, LogwardenError::Scheduler(_)));
    }
}
