//! 규칙 평가 상태 머신
//!
//! [`evaluate`]는 I/O 없이 규칙 하나의 상태를 한 단계 전이시킵니다.
//!
//! ```text
//! Inactive ──should_fire──> Firing ──!should_fire──> Inactive
//!                             │ should_fire
//!                             ├─ cooldown 이내: Suppressed
//!                             └─ cooldown 경과: StillFiring
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::alert::Alert;
use crate::rule::AlertRule;
use crate::window::MetricWindow;

/// 규칙별 평가 상태
#[derive(Debug, Clone, Default)]
pub struct RuleState {
    window: MetricWindow,
    active: Option<Alert>,
    last_event_at: Option<Instant>,
}

impl RuleState {
    /// 활성 알림
    pub fn active(&self) -> Option<&Alert> {
        self.active.as_ref()
    }

    /// 관측 윈도우
    pub fn window(&self) -> &MetricWindow {
        &self.window
    }

    /// 관측 윈도우를 비웁니다. 활성 알림은 유지합니다.
    pub fn reset_window(&mut self) {
        self.window.clear();
    }

    /// 활성 알림을 해소하고 반환합니다.
    pub fn resolve_active(&mut self, at: DateTime<Utc>) -> Option<Alert> {
        self.last_event_at = None;
        self.active.take().map(|mut alert| {
            let value = alert.value;
            alert.resolve(value, at);
            alert
        })
    }
}

/// 평가 결과
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// 윈도우가 아직 관측 누적 구간을 채우지 못함
    Pending,
    /// 조건 불충족, 활성 알림 없음
    Idle,
    /// 새 알림 발생
    Fired(Alert),
    /// cooldown 이후에도 조건 충족
    StillFiring(Alert),
    /// cooldown 이내라 이벤트 억제
    Suppressed,
    /// 활성 알림 해소
    Resolved(Alert),
}

/// 관측값 하나로 규칙 상태를 전이시킵니다.
///
/// `observation`이 `None`이면 관측을 추가하지 않고 기존 윈도우로 평가합니다.
/// 유한하지 않은 값은 버립니다.
pub fn evaluate(
    rule: &AlertRule,
    state: &mut RuleState,
    observation: Option<f64>,
    now: Instant,
    wall_now: DateTime<Utc>,
) -> Transition {
    let sustained = Duration::from_secs(rule.sustained_duration_secs);

    if let Some(value) = observation.filter(|v| v.is_finite()) {
        state.window.push(now, value);
    }
    state.window.prune(now, sustained);

    if !state.window.spans(sustained) {
        return Transition::Pending;
    }
    let Some(value) = state.window.aggregate(rule.condition.aggregation) else {
        return Transition::Pending;
    };
    let should_fire = rule
        .condition
        .operator
        .compare(value, rule.condition.threshold);

    let Some(active) = state.active.as_mut() else {
        if !should_fire {
            return Transition::Idle;
        }
        let alert = Alert::firing(rule, value, wall_now);
        state.active = Some(alert.clone());
        state.last_event_at = Some(now);
        return Transition::Fired(alert);
    };

    if should_fire {
        active.value = value;
        let cooldown = Duration::from_secs(rule.cooldown_secs);
        let since_last = state
            .last_event_at
            .map_or(Duration::MAX, |at| now.saturating_duration_since(at));
        if since_last < cooldown {
            return Transition::Suppressed;
        }
        state.last_event_at = Some(now);
        return Transition::StillFiring(active.clone());
    }

    active.value = value;
    match state.resolve_active(wall_now) {
        Some(alert) => Transition::Resolved(alert),
        None => Transition::Idle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertStatus;
    use crate::rule::{Aggregation, AlertCondition, Operator};
    use logwarden_core::types::Severity;

    fn rule(sustained: u64, cooldown: u64) -> AlertRule {
        AlertRule {
            id: "cpu".to_owned(),
            name: "CPU high".to_owned(),
            severity: Severity::High,
            condition: AlertCondition {
                metric: "cpu".to_owned(),
                operator: Operator::Gt,
                threshold: 100.0,
                aggregation: Aggregation::Avg,
                window_secs: 60,
            },
            sustained_duration_secs: sustained,
            cooldown_secs: cooldown,
            actions: vec![],
            enabled: true,
        }
    }

    fn at(t0: Instant, secs: u64) -> Instant {
        t0 + Duration::from_secs(secs)
    }

    #[test]
    fn pending_until_window_spans_sustained_duration() {
        let rule = rule(2, 10);
        let mut state = RuleState::default();
        let t0 = Instant::now();
        let wall = Utc::now();

        assert_eq!(evaluate(&rule, &mut state, Some(150.0), at(t0, 0), wall), Transition::Pending);
        assert_eq!(evaluate(&rule, &mut state, Some(160.0), at(t0, 1), wall), Transition::Pending);
        match evaluate(&rule, &mut state, Some(170.0), at(t0, 2), wall) {
            Transition::Fired(alert) => {
                assert_eq!(alert.value, 160.0);
                assert_eq!(alert.status, AlertStatus::Firing);
            }
            other => panic!("expected Fired, got {other:?}"),
        }
    }

    #[test]
    fn below_threshold_stays_idle() {
        let rule = rule(2, 10);
        let mut state = RuleState::default();
        let t0 = Instant::now();
        let wall = Utc::now();
        let mut last = Transition::Pending;
        for (i, v) in [50.0, 60.0, 70.0].into_iter().enumerate() {
            last = evaluate(&rule, &mut state, Some(v), at(t0, i as u64), wall);
        }
        assert_eq!(last, Transition::Idle);
        assert!(state.active().is_none());
    }

    #[test]
    fn cooldown_suppresses_then_still_firing() {
        let rule = rule(0, 3);
        let mut state = RuleState::default();
        let t0 = Instant::now();
        let wall = Utc::now();

        assert!(matches!(
            evaluate(&rule, &mut state, Some(200.0), at(t0, 0), wall),
            Transition::Fired(_)
        ));
        assert_eq!(evaluate(&rule, &mut state, Some(200.0), at(t0, 1), wall), Transition::Suppressed);
        assert_eq!(evaluate(&rule, &mut state, Some(200.0), at(t0, 2), wall), Transition::Suppressed);
        assert!(matches!(
            evaluate(&rule, &mut state, Some(210.0), at(t0, 3), wall),
            Transition::StillFiring(ref a) if a.value == 210.0
        ));
        assert_eq!(evaluate(&rule, &mut state, Some(200.0), at(t0, 4), wall), Transition::Suppressed);
    }

    #[test]
    fn resolve_clears_active_slot() {
        let rule = rule(0, 60);
        let mut state = RuleState::default();
        let t0 = Instant::now();
        let wall = Utc::now();

        let fired = match evaluate(&rule, &mut state, Some(150.0), at(t0, 0), wall) {
            Transition::Fired(alert) => alert,
            other => panic!("expected Fired, got {other:?}"),
        };
        match evaluate(&rule, &mut state, Some(10.0), at(t0, 1), wall) {
            Transition::Resolved(alert) => {
                assert_eq!(alert.id, fired.id);
                assert_eq!(alert.status, AlertStatus::Resolved);
                assert_eq!(alert.value, 10.0);
                assert!(alert.resolved_at.is_some());
            }
            other => panic!("expected Resolved, got {other:?}"),
        }
        assert!(state.active().is_none());

        // 해소 후에는 cooldown과 무관하게 새 알림
        assert!(matches!(
            evaluate(&rule, &mut state, Some(150.0), at(t0, 2), wall),
            Transition::Fired(ref a) if a.id != fired.id
        ));
    }

    #[test]
    fn non_finite_observation_ignored() {
        let rule = rule(0, 60);
        let mut state = RuleState::default();
        let t0 = Instant::now();
        assert_eq!(
            evaluate(&rule, &mut state, Some(f64::NAN), t0, Utc::now()),
            Transition::Pending
        );
        assert!(state.window().is_empty());
    }
}
