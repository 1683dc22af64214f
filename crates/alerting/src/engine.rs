//! 알림 엔진 -- 주기적 규칙 평가, 알림 상태 관리, 액션 디스패치
//!
//! [`AlertEngine`]은 core의 [`Pipeline`] trait을 구현하여
//! `logwarden-daemon`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 평가 주기
//! ```text
//! interval tick
//!   ├─ 활성 규칙 스냅샷 (lock)
//!   ├─ MetricSource 동시 조회 (lock 밖, tick 간격 이내)
//!   ├─ evaluate() 상태 전이 + 이력 갱신 (lock)
//!   └─ 메트릭 기록, 액션 디스패치, 알림 전송 (lock 밖)
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use logwarden_core::error::{LogwardenError, PipelineError};
use logwarden_core::metrics as m;
use logwarden_core::pipeline::{HealthStatus, Pipeline};

use crate::alert::{Alert, AlertNotification};
use crate::config::AlertingConfig;
use crate::error::AlertingError;
use crate::evaluator::{RuleState, Transition, evaluate};
use crate::loader::AlertRuleLoader;
use crate::rule::{AlertAction, AlertRule, AlertRuleUpdate};
use crate::source::MetricSource;
use crate::transport::{ActionDispatcher, DefaultTransport, NotificationTransport};

/// 알림 엔진 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨 (재시작 가능)
    Stopped,
}

/// 평가 주기 한 번의 결과 요약
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// 평가한 규칙 수
    pub evaluated: usize,
    /// 윈도우가 아직 채워지지 않은 규칙 수
    pub pending: usize,
    /// 새로 발생한 알림 수
    pub fired: usize,
    /// cooldown 이후 still firing 이벤트 수
    pub still_firing: usize,
    /// cooldown으로 억제된 수
    pub suppressed: usize,
    /// 해소된 알림 수
    pub resolved: usize,
}

/// lock으로 보호되는 엔진 상태
#[derive(Default)]
struct EngineShared {
    rules: BTreeMap<String, AlertRule>,
    states: HashMap<String, RuleState>,
    history: VecDeque<Alert>,
}

impl EngineShared {
    fn push_history(&mut self, alert: Alert, limit: usize) {
        self.history.push_back(alert);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }

    /// 같은 ID의 이력 항목을 교체합니다. 이미 밀려난 항목이면 무시합니다.
    fn replace_history(&mut self, alert: &Alert) {
        if let Some(entry) = self.history.iter_mut().rev().find(|a| a.id == alert.id) {
            *entry = alert.clone();
        }
    }

    fn active_count(&self) -> usize {
        self.states.values().filter(|s| s.active().is_some()).count()
    }
}

/// 평가 루프와 엔진 핸들이 공유하는 부분
#[derive(Clone)]
struct EngineCore {
    config: AlertingConfig,
    shared: Arc<Mutex<EngineShared>>,
    source: Arc<dyn MetricSource>,
    dispatcher: ActionDispatcher,
    notification_tx: mpsc::Sender<AlertNotification>,
}

/// lock 밖에서 처리할 이벤트
enum Outbound {
    Fired {
        alert: Alert,
        actions: Vec<AlertAction>,
    },
    StillFiring(Alert),
    Suppressed,
    Resolved(Alert),
}

impl EngineCore {
    async fn run_tick(&self, now: Instant) -> TickSummary {
        let snapshot: Vec<AlertRule> = {
            let shared = self.shared.lock().await;
            shared.rules.values().filter(|r| r.enabled).cloned().collect()
        };

        let values = self.observe_all(&snapshot).await;
        let observations = snapshot.into_iter().map(|rule| rule.id).zip(values);

        let wall_now = Utc::now();
        let mut summary = TickSummary::default();
        let mut outbound = Vec::new();
        let active = {
            let mut guard = self.shared.lock().await;
            let shared = &mut *guard;
            for (rule_id, observation) in observations {
                // 조회 중 삭제되거나 비활성화된 규칙은 건너뜀
                let Some(rule) = shared.rules.get(&rule_id).filter(|r| r.enabled) else {
                    continue;
                };
                let state = shared.states.entry(rule_id).or_default();
                summary.evaluated += 1;
                match evaluate(rule, state, observation, now, wall_now) {
                    Transition::Pending => summary.pending += 1,
                    Transition::Idle => {}
                    Transition::Fired(alert) => {
                        summary.fired += 1;
                        let actions = rule.enabled_actions().cloned().collect();
                        shared.push_history(alert.clone(), self.config.history_limit);
                        outbound.push(Outbound::Fired { alert, actions });
                    }
                    Transition::StillFiring(alert) => {
                        summary.still_firing += 1;
                        shared.replace_history(&alert);
                        outbound.push(Outbound::StillFiring(alert));
                    }
                    Transition::Suppressed => {
                        summary.suppressed += 1;
                        outbound.push(Outbound::Suppressed);
                    }
                    Transition::Resolved(alert) => {
                        summary.resolved += 1;
                        shared.replace_history(&alert);
                        outbound.push(Outbound::Resolved(alert));
                    }
                }
            }
            shared.active_count()
        };

        metrics::gauge!(m::ALERTING_ACTIVE_ALERTS).set(active as f64);
        for event in outbound {
            match event {
                Outbound::Fired { alert, actions } => {
                    metrics::counter!(
                        m::ALERTING_ALERTS_FIRED_TOTAL,
                        m::LABEL_SEVERITY => alert.severity.as_str()
                    )
                    .increment(1);
                    tracing::warn!(
                        alert_id = %alert.id,
                        rule_id = %alert.rule_id,
                        severity = alert.severity.as_str(),
                        value = alert.value,
                        threshold = alert.threshold,
                        "alert fired"
                    );
                    let notification = AlertNotification::Fired(alert);
                    self.dispatcher.dispatch(actions, &notification);
                    self.notify(notification);
                }
                Outbound::StillFiring(alert) => {
                    tracing::info!(alert_id = %alert.id, rule_id = %alert.rule_id, value = alert.value, "alert still firing");
                    self.notify(AlertNotification::StillFiring(alert));
                }
                Outbound::Suppressed => {
                    metrics::counter!(m::ALERTING_SUPPRESSED_TOTAL).increment(1);
                }
                Outbound::Resolved(alert) => self.announce_resolved(alert),
            }
        }

        if summary.evaluated > 0 {
            tracing::debug!(
                evaluated = summary.evaluated,
                pending = summary.pending,
                fired = summary.fired,
                resolved = summary.resolved,
                "alert rules evaluated"
            );
        }
        summary
    }

    /// 모든 규칙의 메트릭을 동시에 조회합니다.
    ///
    /// 조회 전체가 `min(action_timeout, tick_interval)` 안에 끝나며,
    /// 기한을 넘긴 조회는 관측 없음(`None`)으로 처리됩니다. 결과는 `rules` 순서입니다.
    async fn observe_all(&self, rules: &[AlertRule]) -> Vec<Option<f64>> {
        let deadline = Instant::now() + self.config.action_timeout.min(self.config.tick_interval);
        let mut queries = JoinSet::new();
        for (index, rule) in rules.iter().enumerate() {
            let source = Arc::clone(&self.source);
            let rule_id = rule.id.clone();
            let metric = rule.condition.metric.clone();
            let window = Duration::from_secs(rule.condition.window_secs);
            queries.spawn(async move {
                let query = source.current_value(&metric, window);
                let value = match tokio::time::timeout_at(deadline, query).await {
                    Ok(Ok(value)) => value,
                    Ok(Err(e)) => {
                        tracing::warn!(rule_id = %rule_id, metric = %metric, error = %e, "metric query failed");
                        None
                    }
                    Err(_elapsed) => {
                        tracing::warn!(rule_id = %rule_id, metric = %metric, "metric query timed out");
                        None
                    }
                };
                (index, value)
            });
        }

        let mut observations = vec![None; rules.len()];
        while let Some(joined) = queries.join_next().await {
            match joined {
                Ok((index, value)) => observations[index] = value,
                Err(e) => tracing::warn!(error = %e, "metric query task failed"),
            }
        }
        observations
    }

    fn announce_resolved(&self, alert: Alert) {
        metrics::counter!(m::ALERTING_ALERTS_RESOLVED_TOTAL).increment(1);
        tracing::info!(alert_id = %alert.id, rule_id = %alert.rule_id, value = alert.value, "alert resolved");
        self.notify(AlertNotification::Resolved(alert));
    }

    fn notify(&self, notification: AlertNotification) {
        match self.notification_tx.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(n)) => {
                tracing::warn!(alert_id = %n.alert().id, event = n.kind(), "notification channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("notification receiver dropped");
            }
        }
    }

    /// 규칙의 활성 알림을 해소하고 이력/채널에 반영합니다. lock 안에서 호출합니다.
    fn resolve_rule(&self, shared: &mut EngineShared, rule_id: &str) -> Option<Alert> {
        let alert = shared
            .states
            .get_mut(rule_id)
            .and_then(|state| state.resolve_active(Utc::now()))?;
        shared.replace_history(&alert);
        Some(alert)
    }

    async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                at = ticker.tick() => {
                    self.run_tick(at).await;
                }
            }
        }
        tracing::debug!("alert evaluation loop exited");
    }
}

/// 알림 엔진
///
/// # 사용 예시
/// ```ignore
/// use logwarden_alerting::{AlertEngineBuilder, MetricRegistry};
///
/// let registry = MetricRegistry::new();
/// let (mut engine, notifications) = AlertEngineBuilder::new()
///     .config(config)
///     .source(Arc::new(registry.clone()))
///     .build()?;
///
/// engine.start().await?;
/// ```
pub struct AlertEngine {
    core: EngineCore,
    state: EngineState,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    rules_loaded: bool,
}

impl AlertEngine {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            EngineState::Initialized => "initialized",
            EngineState::Running => "running",
            EngineState::Stopped => "stopped",
        }
    }

    /// 엔진 설정
    pub fn config(&self) -> &AlertingConfig {
        &self.core.config
    }

    /// 규칙을 추가합니다. 같은 ID가 있으면 에러.
    pub async fn add_rule(&self, rule: AlertRule) -> Result<(), AlertingError> {
        rule.validate()?;
        let mut shared = self.core.shared.lock().await;
        if shared.rules.contains_key(&rule.id) {
            return Err(AlertingError::DuplicateRule(rule.id));
        }
        tracing::info!(rule_id = %rule.id, metric = %rule.condition.metric, "alert rule added");
        shared.states.insert(rule.id.clone(), RuleState::default());
        shared.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    /// 규칙을 제거하고 반환합니다. 활성 알림이 있으면 해소 처리합니다.
    pub async fn remove_rule(&self, rule_id: &str) -> Result<AlertRule, AlertingError> {
        let (rule, resolved, active) = {
            let mut shared = self.core.shared.lock().await;
            let rule = shared
                .rules
                .remove(rule_id)
                .ok_or_else(|| AlertingError::RuleNotFound(rule_id.to_owned()))?;
            let resolved = self.core.resolve_rule(&mut shared, rule_id);
            shared.states.remove(rule_id);
            (rule, resolved, shared.active_count())
        };
        tracing::info!(rule_id, "alert rule removed");
        metrics::gauge!(m::ALERTING_ACTIVE_ALERTS).set(active as f64);
        if let Some(alert) = resolved {
            self.core.announce_resolved(alert);
        }
        Ok(rule)
    }

    /// 규칙을 부분 갱신하고 갱신된 규칙을 반환합니다.
    ///
    /// 조건이나 관측 구간이 바뀌면 관측 윈도우를 비웁니다.
    /// 비활성화하면 활성 알림을 해소합니다.
    pub async fn update_rule(
        &self,
        rule_id: &str,
        update: AlertRuleUpdate,
    ) -> Result<AlertRule, AlertingError> {
        let (updated, resolved, active) = {
            let mut shared = self.core.shared.lock().await;
            let current = shared
                .rules
                .get(rule_id)
                .ok_or_else(|| AlertingError::RuleNotFound(rule_id.to_owned()))?;
            let updated = update.apply_to(current);
            updated.validate()?;

            if update.resets_window()
                && let Some(state) = shared.states.get_mut(rule_id)
            {
                state.reset_window();
            }
            let resolved = if updated.enabled {
                None
            } else {
                self.core.resolve_rule(&mut shared, rule_id)
            };
            shared.rules.insert(rule_id.to_owned(), updated.clone());
            (updated, resolved, shared.active_count())
        };
        tracing::info!(rule_id, enabled = updated.enabled, "alert rule updated");
        metrics::gauge!(m::ALERTING_ACTIVE_ALERTS).set(active as f64);
        if let Some(alert) = resolved {
            self.core.announce_resolved(alert);
        }
        Ok(updated)
    }

    /// 모든 규칙 (ID 순)
    pub async fn get_rules(&self) -> Vec<AlertRule> {
        self.core.shared.lock().await.rules.values().cloned().collect()
    }

    /// ID로 규칙을 조회합니다.
    pub async fn get_rule(&self, rule_id: &str) -> Option<AlertRule> {
        self.core.shared.lock().await.rules.get(rule_id).cloned()
    }

    /// 현재 발생 중인 알림 (규칙 ID 순)
    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        let shared = self.core.shared.lock().await;
        shared
            .rules
            .keys()
            .filter_map(|id| shared.states.get(id).and_then(RuleState::active))
            .cloned()
            .collect()
    }

    /// 최근 알림 이력 최대 `limit`개 (최신 순)
    pub async fn get_alert_history(&self, limit: usize) -> Vec<Alert> {
        let shared = self.core.shared.lock().await;
        shared.history.iter().rev().take(limit).cloned().collect()
    }

    /// 현재 시각으로 평가 주기를 한 번 실행합니다.
    ///
    /// 평가 루프와 독립적으로 호출할 수 있습니다.
    pub async fn evaluate_once(&self) -> TickSummary {
        self.core.run_tick(Instant::now()).await
    }

    async fn load_rule_dir(&mut self) -> Result<(), AlertingError> {
        if self.rules_loaded {
            return Ok(());
        }
        if let Some(dir) = self.core.config.rule_dir.clone() {
            let rules = AlertRuleLoader::load_directory(&dir).await?;
            for rule in rules {
                let id = rule.id.clone();
                if let Err(e) = self.add_rule(rule).await {
                    tracing::warn!(rule_id = %id, error = %e, "skipping alert rule from directory");
                }
            }
        }
        self.rules_loaded = true;
        Ok(())
    }
}

impl Pipeline for AlertEngine {
    async fn start(&mut self) -> Result<(), LogwardenError> {
        if self.state == EngineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        self.load_rule_dir().await?;

        let rule_count = self.core.shared.lock().await.rules.len();
        tracing::info!(
            rules = rule_count,
            tick_interval_secs = self.core.config.tick_interval.as_secs(),
            "starting alert engine"
        );

        self.cancel = CancellationToken::new();
        let core = self.core.clone();
        let interval = self.core.config.tick_interval;
        self.task = Some(tokio::spawn(core.run(interval, self.cancel.clone())));
        self.state = EngineState::Running;

        tracing::info!("alert engine started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LogwardenError> {
        if self.state != EngineState::Running {
            return Err(AlertingError::NotRunning.into());
        }
        tracing::info!("stopping alert engine");
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "alert evaluation loop ended abnormally");
        }
        self.state = EngineState::Stopped;
        tracing::info!("alert engine stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            EngineState::Running => match &self.task {
                Some(task) if !task.is_finished() => HealthStatus::Healthy,
                _ => HealthStatus::Unhealthy("evaluation loop exited".to_owned()),
            },
            EngineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            EngineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

impl Drop for AlertEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// 알림 엔진 빌더
pub struct AlertEngineBuilder {
    config: AlertingConfig,
    source: Option<Arc<dyn MetricSource>>,
    transport: Option<Arc<dyn NotificationTransport>>,
    rules: Vec<AlertRule>,
    notification_tx: Option<mpsc::Sender<AlertNotification>>,
}

impl AlertEngineBuilder {
    /// 기본 설정으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: AlertingConfig::default(),
            source: None,
            transport: None,
            rules: Vec::new(),
            notification_tx: None,
        }
    }

    /// 엔진 설정
    pub fn config(mut self, config: AlertingConfig) -> Self {
        self.config = config;
        self
    }

    /// 메트릭 소스 (필수)
    pub fn source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// 알림 전송 구현. 지정하지 않으면 [`DefaultTransport`].
    pub fn transport(mut self, transport: Arc<dyn NotificationTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 초기 규칙 하나
    pub fn rule(mut self, rule: AlertRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// 초기 규칙 여러 개
    pub fn rules(mut self, rules: impl IntoIterator<Item = AlertRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// 외부 알림 채널. 지정하면 `build()`는 수신기를 반환하지 않습니다.
    pub fn notification_sender(mut self, tx: mpsc::Sender<AlertNotification>) -> Self {
        self.notification_tx = Some(tx);
        self
    }

    /// 엔진을 생성합니다.
    ///
    /// 내부에서 채널을 만든 경우 알림 수신기를 함께 반환합니다.
    pub fn build(
        self,
    ) -> Result<(AlertEngine, Option<mpsc::Receiver<AlertNotification>>), AlertingError> {
        self.config.validate()?;

        let source = self.source.ok_or_else(|| AlertingError::Config {
            field: "source".to_owned(),
            reason: "metric source is required".to_owned(),
        })?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(DefaultTransport::new(
                self.config.smtp.as_ref(),
                self.config.action_timeout,
            )?),
        };

        let mut shared = EngineShared::default();
        for rule in self.rules {
            rule.validate()?;
            if shared.rules.contains_key(&rule.id) {
                return Err(AlertingError::DuplicateRule(rule.id));
            }
            shared.states.insert(rule.id.clone(), RuleState::default());
            shared.rules.insert(rule.id.clone(), rule);
        }

        let (notification_tx, notification_rx) = match self.notification_tx {
            Some(tx) => (tx, None),
            None => {
                let (tx, rx) = mpsc::channel(self.config.notification_channel_capacity);
                (tx, Some(rx))
            }
        };

        let dispatcher = ActionDispatcher::new(transport, self.config.action_timeout);
        let engine = AlertEngine {
            core: EngineCore {
                config: self.config,
                shared: Arc::new(Mutex::new(shared)),
                source,
                dispatcher,
                notification_tx,
            },
            state: EngineState::Initialized,
            cancel: CancellationToken::new(),
            task: None,
            rules_loaded: false,
        };
        Ok((engine, notification_rx))
    }
}

impl Default for AlertEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
