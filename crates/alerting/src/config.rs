//! 알림 엔진 설정
//!
//! core의 [`AlertingSection`]에서 런타임 설정을 파생합니다.

use std::path::PathBuf;
use std::time::Duration;

use logwarden_core::config::{AlertingSection, SmtpConfig};

use crate::error::AlertingError;

/// 보관 가능한 알림 이력 최대값
const MAX_HISTORY_LIMIT: usize = 1_000_000;

/// 이메일 액션용 SMTP 설정
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    /// SMTP 서버 호스트
    pub host: String,
    /// SMTP 포트
    pub port: u16,
    /// 인증 사용자명 (비어 있으면 인증 없음)
    pub username: String,
    /// 인증 비밀번호
    pub password: String,
    /// 발신 주소
    pub from: String,
    /// STARTTLS 사용 여부
    pub starttls: bool,
}

impl SmtpSettings {
    fn from_core(smtp: &SmtpConfig) -> Option<Self> {
        (!smtp.host.is_empty()).then(|| Self {
            host: smtp.host.clone(),
            port: smtp.port,
            username: smtp.username.clone(),
            password: smtp.password.clone(),
            from: smtp.from.clone(),
            starttls: smtp.starttls,
        })
    }
}

/// 알림 엔진 런타임 설정
#[derive(Debug, Clone)]
pub struct AlertingConfig {
    /// 평가 주기
    pub tick_interval: Duration,
    /// 알림 규칙 YAML 디렉토리
    pub rule_dir: Option<PathBuf>,
    /// 보관할 알림 이력 최대 개수
    pub history_limit: usize,
    /// 개별 액션 실행 타임아웃
    pub action_timeout: Duration,
    /// 알림 이벤트 채널 용량
    pub notification_channel_capacity: usize,
    /// SMTP 설정 (없으면 이메일 액션은 실패 처리)
    pub smtp: Option<SmtpSettings>,
}

impl AlertingConfig {
    /// core 설정 섹션에서 런타임 설정을 생성합니다.
    pub fn from_core(section: &AlertingSection) -> Self {
        Self {
            tick_interval: Duration::from_secs(section.tick_interval_secs),
            rule_dir: (!section.rule_dir.is_empty()).then(|| PathBuf::from(&section.rule_dir)),
            history_limit: section.history_limit,
            action_timeout: Duration::from_secs(section.action_timeout_secs),
            notification_channel_capacity: section.notification_channel_capacity,
            smtp: SmtpSettings::from_core(&section.smtp),
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AlertingError> {
        if self.tick_interval.is_zero() {
            return Err(AlertingError::Config {
                field: "tick_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.history_limit == 0 || self.history_limit > MAX_HISTORY_LIMIT {
            return Err(AlertingError::Config {
                field: "history_limit".to_owned(),
                reason: format!("must be between 1 and {MAX_HISTORY_LIMIT}"),
            });
        }
        if self.action_timeout.is_zero() {
            return Err(AlertingError::Config {
                field: "action_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.notification_channel_capacity == 0 {
            return Err(AlertingError::Config {
                field: "notification_channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self::from_core(&AlertingSection::default())
    }
}
