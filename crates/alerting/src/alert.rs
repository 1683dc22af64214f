//! 알림과 알림 이벤트 타입

use std::fmt;

use chrono::{DateTime, Utc};
use logwarden_core::types::Severity;
use serde::{Deserialize, Serialize};

use crate::rule::AlertRule;

/// 알림 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// 발생 중
    Firing,
    /// 해소됨
    Resolved,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Firing => f.write_str("firing"),
            Self::Resolved => f.write_str("resolved"),
        }
    }
}

/// 알림
///
/// 규칙이 발생 상태로 전이할 때 생성되고, 해소 시 `status`와 `resolved_at`이 갱신됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// 알림 ID
    pub id: String,
    /// 규칙 ID
    pub rule_id: String,
    /// 규칙 이름
    pub rule_name: String,
    /// 심각도
    pub severity: Severity,
    /// 상태
    pub status: AlertStatus,
    /// 마지막 평가의 집계값
    pub value: f64,
    /// 규칙 임계값
    pub threshold: f64,
    /// 발생 시각
    pub timestamp: DateTime<Utc>,
    /// 해소 시각
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// 규칙으로부터 발생 상태의 새 알림을 생성합니다.
    pub fn firing(rule: &AlertRule, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            status: AlertStatus::Firing,
            value,
            threshold: rule.condition.threshold,
            timestamp,
            resolved_at: None,
        }
    }

    /// 해소 처리합니다.
    pub fn resolve(&mut self, value: f64, at: DateTime<Utc>) {
        self.status = AlertStatus::Resolved;
        self.value = value;
        self.resolved_at = Some(at);
    }

    /// 발생 중인지 확인합니다.
    pub fn is_firing(&self) -> bool {
        self.status == AlertStatus::Firing
    }

    /// 사람이 읽는 요약
    pub fn summary(&self) -> String {
        match self.status {
            AlertStatus::Firing => format!(
                "[{}] {} firing: value {:.2} (threshold {:.2})",
                self.severity, self.rule_name, self.value, self.threshold
            ),
            AlertStatus::Resolved => format!(
                "[{}] {} resolved: value {:.2} (threshold {:.2})",
                self.severity, self.rule_name, self.value, self.threshold
            ),
        }
    }
}

/// 알림 엔진이 내보내는 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "alert", rename_all = "snake_case")]
pub enum AlertNotification {
    /// 새 알림 발생
    Fired(Alert),
    /// cooldown 이후에도 조건이 계속 충족됨 (액션은 다시 실행하지 않음)
    StillFiring(Alert),
    /// 알림 해소
    Resolved(Alert),
}

impl AlertNotification {
    /// 이벤트의 알림
    pub fn alert(&self) -> &Alert {
        match self {
            Self::Fired(alert) | Self::StillFiring(alert) | Self::Resolved(alert) => alert,
        }
    }

    /// 이벤트 종류 이름
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fired(_) => "fired",
            Self::StillFiring(_) => "still_firing",
            Self::Resolved(_) => "resolved",
        }
    }
}
