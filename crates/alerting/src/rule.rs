//! 알림 규칙 타입
//!
//! YAML 규칙 파일 또는 API로 등록되는 선언적 알림 규칙을 정의합니다.

use std::collections::BTreeMap;
use std::fmt;

use logwarden_core::types::Severity;
use serde::{Deserialize, Serialize};

use crate::error::AlertingError;

/// 규칙 ID 최대 길이
const MAX_RULE_ID_LEN: usize = 256;

/// 비교 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

/// `eq`/`ne`의 상대 허용 오차. 크기가 1 미만이면 절대 오차로 적용됩니다.
const EQ_RELATIVE_TOLERANCE: f64 = 1e-9;

fn approx_eq(value: f64, threshold: f64) -> bool {
    let scale = value.abs().max(threshold.abs()).max(1.0);
    (value - threshold).abs() <= EQ_RELATIVE_TOLERANCE * scale
}

impl Operator {
    /// `value <op> threshold`를 계산합니다.
    ///
    /// `eq`/`ne`는 집계 과정의 부동소수점 오차를 허용하도록 상대 오차로 비교합니다.
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Gte => value >= threshold,
            Self::Lt => value < threshold,
            Self::Lte => value <= threshold,
            Self::Eq => approx_eq(value, threshold),
            Self::Ne => !approx_eq(value, threshold),
        }
    }

    /// 기호 표기
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// 윈도우 집계 함수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// 평균
    #[default]
    Avg,
    /// 합계
    Sum,
    /// 최솟값
    Min,
    /// 최댓값
    Max,
    /// 관측 수
    Count,
}

impl Aggregation {
    /// 값 목록을 집계합니다. 비어 있으면 `None`.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let result = match self {
            Self::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Self::Sum => values.iter().sum(),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Count => values.len() as f64,
        };
        Some(result)
    }
}

/// 알림 조건
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    /// 관측할 메트릭 이름
    pub metric: String,
    /// 비교 연산자
    pub operator: Operator,
    /// 임계값
    pub threshold: f64,
    /// 집계 함수
    #[serde(default)]
    pub aggregation: Aggregation,
    /// 메트릭 소스에 요청하는 관측 구간 (초)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_window_secs() -> u64 {
    60
}

/// 알림 액션 -- 종류마다 필요한 설정만 가집니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertAction {
    /// tracing 로그 출력
    Console,
    /// 임의 URL로 JSON POST
    Webhook {
        /// 대상 URL
        url: String,
        /// 추가 요청 헤더
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    /// 채팅 incoming webhook (`{"text": ...}` 형식)
    ChatHook {
        /// incoming webhook URL
        url: String,
        /// 채널 지정 (선택)
        #[serde(default)]
        channel: Option<String>,
    },
    /// SMTP 이메일
    Email {
        /// 수신자 주소
        to: Vec<String>,
        /// 제목 접두어
        #[serde(default)]
        subject_prefix: Option<String>,
    },
}

impl AlertAction {
    /// 메트릭 레이블용 고정 이름
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Webhook { .. } => "webhook",
            Self::ChatHook { .. } => "chat_hook",
            Self::Email { .. } => "email",
        }
    }

    fn validate(&self, rule_id: &str) -> Result<(), AlertingError> {
        let invalid = |reason: String| AlertingError::RuleValidation {
            rule_id: rule_id.to_owned(),
            reason,
        };
        match self {
            Self::Console => Ok(()),
            Self::Webhook { url, .. } | Self::ChatHook { url, .. } => {
                if url.starts_with("http://") || url.starts_with("https://") {
                    Ok(())
                } else {
                    Err(invalid(format!(
                        "{} url must start with http:// or https://",
                        self.kind_name()
                    )))
                }
            }
            Self::Email { to, .. } => {
                if to.is_empty() {
                    return Err(invalid("email action needs at least one recipient".to_owned()));
                }
                match to.iter().find(|addr| !addr.contains('@')) {
                    Some(addr) => Err(invalid(format!("invalid email recipient '{addr}'"))),
                    None => Ok(()),
                }
            }
        }
    }
}

impl fmt::Display for AlertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}

/// 규칙에 등록된 액션과 활성화 여부
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// 활성화 여부
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 액션
    #[serde(flatten)]
    pub action: AlertAction,
}

impl ActionSpec {
    /// 활성화된 액션
    pub fn enabled(action: AlertAction) -> Self {
        Self {
            enabled: true,
            action,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_cooldown_secs() -> u64 {
    300
}

/// 알림 규칙 -- 하나의 YAML 파일에 대응합니다.
///
/// # YAML 스키마
/// ```yaml
/// id: error_rate_high
/// name: Error rate above 100/min
/// severity: high
/// condition:
///   metric: classification_errors
///   operator: gt
///   threshold: 100
///   aggregation: avg
///   window_secs: 60
/// sustained_duration_secs: 120
/// cooldown_secs: 600
/// actions:
///   - type: console
///   - type: webhook
///     url: https://hooks.example.com/logwarden
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// 규칙 고유 ID
    pub id: String,
    /// 표시 이름
    pub name: String,
    /// 심각도
    #[serde(default)]
    pub severity: Severity,
    /// 조건
    pub condition: AlertCondition,
    /// 조건을 평가하기 전에 관측이 쌓여야 하는 구간 (초)
    #[serde(default)]
    pub sustained_duration_secs: u64,
    /// 알림 후 재이벤트까지의 최소 간격 (초)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// 알림 발생 시 실행할 액션
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    /// 활성화 여부
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AlertRule {
    /// 규칙의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AlertingError> {
        let invalid = |reason: &str| AlertingError::RuleValidation {
            rule_id: if self.id.is_empty() {
                "(empty)".to_owned()
            } else {
                self.id.clone()
            },
            reason: reason.to_owned(),
        };

        if self.id.is_empty() {
            return Err(invalid("rule id must not be empty"));
        }
        if self.id.len() > MAX_RULE_ID_LEN {
            return Err(invalid("rule id is too long"));
        }
        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.condition.metric.is_empty() {
            return Err(invalid("condition.metric must not be empty"));
        }
        if !self.condition.threshold.is_finite() {
            return Err(invalid("condition.threshold must be a finite number"));
        }
        if self.condition.window_secs == 0 {
            return Err(invalid("condition.window_secs must be greater than 0"));
        }
        for spec in &self.actions {
            spec.action.validate(&self.id)?;
        }
        Ok(())
    }

    /// 활성화된 액션
    pub fn enabled_actions(&self) -> impl Iterator<Item = &AlertAction> {
        self.actions
            .iter()
            .filter(|spec| spec.enabled)
            .map(|spec| &spec.action)
    }
}

/// 규칙 부분 갱신
///
/// `None`인 필드는 기존 값을 유지합니다. ID는 바꿀 수 없습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertRuleUpdate {
    /// 표시 이름
    #[serde(default)]
    pub name: Option<String>,
    /// 심각도
    #[serde(default)]
    pub severity: Option<Severity>,
    /// 조건
    #[serde(default)]
    pub condition: Option<AlertCondition>,
    /// 관측 누적 구간 (초)
    #[serde(default)]
    pub sustained_duration_secs: Option<u64>,
    /// cooldown (초)
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    /// 액션 목록 전체 교체
    #[serde(default)]
    pub actions: Option<Vec<ActionSpec>>,
    /// 활성화 여부
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl AlertRuleUpdate {
    /// 갱신을 적용한 새 규칙을 반환합니다. 검증은 호출자가 합니다.
    pub fn apply_to(&self, rule: &AlertRule) -> AlertRule {
        let mut updated = rule.clone();
        if let Some(name) = &self.name {
            updated.name = name.clone();
        }
        if let Some(severity) = self.severity {
            updated.severity = severity;
        }
        if let Some(condition) = &self.condition {
            updated.condition = condition.clone();
        }
        if let Some(secs) = self.sustained_duration_secs {
            updated.sustained_duration_secs = secs;
        }
        if let Some(secs) = self.cooldown_secs {
            updated.cooldown_secs = secs;
        }
        if let Some(actions) = &self.actions {
            updated.actions = actions.clone();
        }
        if let Some(enabled) = self.enabled {
            updated.enabled = enabled;
        }
        updated
    }

    /// 관측 윈도우를 초기화해야 하는 변경인지 확인합니다.
    pub(crate) fn resets_window(&self) -> bool {
        self.condition.is_some() || self.sustained_duration_secs.is_some()
    }
}
