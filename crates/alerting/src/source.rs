//! 메트릭 소스 -- 알림 규칙이 관측하는 값의 공급자
//!
//! [`MetricSource`]는 "이름으로 현재 값 조회" 하나만 요구하는 dyn 호환 trait입니다.
//! [`MetricRegistry`]는 게이지와 시간 구간 이벤트 시리즈를 보관하는 메모리 구현으로,
//! daemon의 분류 핸들러가 여기에 분류 결과를 기록합니다.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use logwarden_core::pipeline::BoxFuture;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::AlertingError;

/// 이벤트 시리즈 기본 보관 기간
const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// 메트릭 값 공급자
pub trait MetricSource: Send + Sync {
    /// `window` 구간 기준 메트릭의 현재 값. 알 수 없는 메트릭이면 `None`.
    fn current_value<'a>(
        &'a self,
        metric: &'a str,
        window: Duration,
    ) -> BoxFuture<'a, Result<Option<f64>, AlertingError>>;
}

#[derive(Debug, Default)]
struct EventSeries {
    events: VecDeque<(Instant, f64)>,
    total: f64,
}

impl EventSeries {
    fn prune(&mut self, now: Instant, retention: Duration) {
        while let Some((at, _)) = self.events.front() {
            if now.saturating_duration_since(*at) > retention {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    fn sum_within(&self, now: Instant, window: Duration) -> f64 {
        self.events
            .iter()
            .rev()
            .take_while(|(at, _)| now.saturating_duration_since(*at) <= window)
            .map(|(_, amount)| amount)
            .sum()
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    gauges: HashMap<String, f64>,
    series: HashMap<String, EventSeries>,
}

/// 메모리 메트릭 레지스트리
///
/// - 게이지: 마지막으로 설정된 값
/// - 이벤트 시리즈: 시각이 기록된 증가분. 조회 시 `window` 구간의 합계를 돌려줍니다.
///
/// 같은 이름이 게이지와 시리즈에 모두 있으면 게이지가 우선합니다.
/// 복제본은 같은 저장소를 공유합니다.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    retention: Duration,
}

impl MetricRegistry {
    /// 기본 보관 기간(1시간)으로 생성합니다.
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// 이벤트 보관 기간을 지정하여 생성합니다.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
            retention,
        }
    }

    /// 게이지 값을 설정합니다.
    pub async fn set_gauge(&self, name: &str, value: f64) {
        self.inner
            .write()
            .await
            .gauges
            .insert(name.to_owned(), value);
    }

    /// 게이지 값을 조회합니다.
    pub async fn gauge(&self, name: &str) -> Option<f64> {
        self.inner.read().await.gauges.get(name).copied()
    }

    /// 이벤트 시리즈에 증가분을 기록합니다.
    pub async fn record(&self, name: &str, amount: f64) {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let series = inner.series.entry(name.to_owned()).or_default();
        series.events.push_back((now, amount));
        series.total += amount;
        series.prune(now, self.retention);
    }

    /// 이벤트 시리즈를 1 증가시킵니다.
    pub async fn increment(&self, name: &str) {
        self.record(name, 1.0).await;
    }

    /// 시리즈의 누적 합계. 없으면 0.
    pub async fn total(&self, name: &str) -> f64 {
        self.inner
            .read()
            .await
            .series
            .get(name)
            .map_or(0.0, |series| series.total)
    }

    /// 최근 `window` 구간의 시리즈 합계. 시리즈가 없으면 `None`.
    pub async fn windowed_sum(&self, name: &str, window: Duration) -> Option<f64> {
        let now = Instant::now();
        self.inner
            .read()
            .await
            .series
            .get(name)
            .map(|series| series.sum_within(now, window.min(self.retention)))
    }

    /// 등록된 메트릭 이름 (정렬됨)
    pub async fn names(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = inner
            .gauges
            .keys()
            .chain(inner.series.keys())
            .cloned()
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// 게이지 값과 시리즈 누적 합계의 스냅샷
    pub async fn snapshot(&self) -> BTreeMap<String, f64> {
        let inner = self.inner.read().await;
        let mut snapshot: BTreeMap<String, f64> = inner
            .series
            .iter()
            .map(|(name, series)| (name.clone(), series.total))
            .collect();
        snapshot.extend(inner.gauges.iter().map(|(k, v)| (k.clone(), *v)));
        snapshot
    }

    async fn lookup(&self, metric: &str, window: Duration) -> Option<f64> {
        if let Some(value) = self.gauge(metric).await {
            return Some(value);
        }
        self.windowed_sum(metric, window).await
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for MetricRegistry {
    fn current_value<'a>(
        &'a self,
        metric: &'a str,
        window: Duration,
    ) -> BoxFuture<'a, Result<Option<f64>, AlertingError>> {
        Box::pin(async move { Ok(self.lookup(metric, window).await) })
    }
}
