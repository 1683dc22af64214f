//! 스케줄러 설정

use std::time::Duration;

use logwarden_core::config::SchedulerSection;

use crate::error::SchedulerError;

/// 스케줄러 런타임 설정
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 실행기 수 (항상 이 수를 유지)
    pub pool_size: usize,
    /// 종료 시 실행 중인 작업을 기다리는 최대 시간
    pub shutdown_timeout: Duration,
    /// 결과 채널 용량
    pub result_channel_capacity: usize,
    /// 모든 실행기가 바쁠 때 Degraded로 보고하는 대기열 길이
    pub queue_high_watermark: usize,
}

impl SchedulerConfig {
    /// core 설정 섹션에서 런타임 설정을 생성합니다.
    pub fn from_core(section: &SchedulerSection) -> Self {
        Self {
            pool_size: section.pool_size,
            shutdown_timeout: Duration::from_secs(section.shutdown_timeout_secs),
            result_channel_capacity: section.result_channel_capacity,
            queue_high_watermark: section.queue_high_watermark,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.pool_size == 0 || self.pool_size > 1024 {
            return Err(SchedulerError::Config {
                field: "pool_size".to_owned(),
                reason: "must be between 1 and 1024".to_owned(),
            });
        }
        if self.result_channel_capacity == 0 {
            return Err(SchedulerError::Config {
                field: "result_channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_core(&SchedulerSection::default())
    }
}
