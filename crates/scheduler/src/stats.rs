//! 스케줄러 통계와 종료 보고서

use serde::{Deserialize, Serialize};

/// 스케줄러 통계 스냅샷
///
/// control 태스크가 이벤트를 처리할 때마다 갱신합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// 현재 실행기 수
    pub total_executors: usize,
    /// 작업을 실행 중인 실행기 수
    pub active_executors: usize,
    /// 유휴 실행기 수
    pub idle_executors: usize,
    /// 완료된 작업 수 (실패 결과 포함)
    pub tasks_processed: u64,
    /// 핸들러가 실패를 반환한 작업 수
    pub tasks_failed: u64,
    /// 실행기 크래시로 결과 없이 유실된 작업 수
    pub tasks_lost: u64,
    /// 평균 처리 시간 (밀리초, 누적 평균)
    pub average_processing_time_ms: f64,
    /// 대기 중인 작업 수
    pub queue_length: usize,
    /// 실행기 크래시 수
    pub errors: u64,
}

impl SchedulerStats {
    /// 완료된 작업의 처리 시간을 누적 평균에 반영합니다.
    pub(crate) fn record_completion(&mut self, processing_time_ms: u64, success: bool) {
        self.tasks_processed += 1;
        if !success {
            self.tasks_failed += 1;
        }
        let n = self.tasks_processed as f64;
        self.average_processing_time_ms +=
            (processing_time_ms as f64 - self.average_processing_time_ms) / n;
    }
}

/// 종료 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// 대기 시간 안에 끝난 실행 중 작업 수
    pub completed_during_drain: usize,
    /// 대기 시간 초과로 강제 종료된 작업 수
    pub aborted: usize,
    /// 실행되지 못하고 버려진 대기 작업 수
    pub dropped_queued: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_average() {
        let mut stats = SchedulerStats::default();
        stats.record_completion(10, true);
        stats.record_completion(20, false);
        stats.record_completion(30, true);
        assert_eq!(stats.tasks_processed, 3);
        assert_eq!(stats.tasks_failed, 1);
        assert!((stats.average_processing_time_ms - 20.0).abs() < 1e-9);
    }
}
