//! 규칙별 관측 윈도우
//!
//! 평가 주기마다 관측값 하나를 추가하고, 오래된 관측을 잘라냅니다.
//! 시각은 `tokio::time::Instant`이므로 테스트에서 시간을 제어할 수 있습니다.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::rule::Aggregation;

/// 규칙당 보관하는 관측 최대 수
const MAX_SAMPLES: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    value: f64,
}

/// 시간순 관측 버퍼
#[derive(Debug, Clone, Default)]
pub struct MetricWindow {
    samples: VecDeque<Sample>,
}

impl MetricWindow {
    /// 빈 윈도우를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 관측값을 추가합니다. 최대 수를 넘으면 가장 오래된 관측을 버립니다.
    pub fn push(&mut self, at: Instant, value: f64) {
        if self.samples.len() >= MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { at, value });
    }

    /// `now` 기준으로 `keep`보다 오래된 관측을 제거하고 제거한 수를 반환합니다.
    pub fn prune(&mut self, now: Instant, keep: Duration) -> usize {
        let before = self.samples.len();
        while let Some(front) = self.samples.front() {
            if now.saturating_duration_since(front.at) > keep {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        before - self.samples.len()
    }

    /// 가장 오래된 관측과 최신 관측의 간격이 `duration` 이상인지 확인합니다.
    pub fn spans(&self, duration: Duration) -> bool {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => last.at.saturating_duration_since(first.at) >= duration,
            _ => false,
        }
    }

    /// 윈도우를 집계합니다. 비어 있으면 `None`.
    pub fn aggregate(&self, aggregation: Aggregation) -> Option<f64> {
        aggregation.apply(&self.values())
    }

    /// 관측값 목록 (오래된 순)
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    /// 관측 수
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 모든 관측을 제거합니다.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
