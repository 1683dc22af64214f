//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 수집된 로그 레코드와 레벨/심각도 열거형을 정의합니다.
//! 스케줄러 payload, 분류 컨텍스트, 알림 규칙이 모두 이 타입들을 공유합니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 수집된 로그 레코드
///
/// 생산자가 제출하는 원본 로그입니다. `id`는 문서 저장소의 로그 식별자와 같습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// 로그 ID
    pub id: String,
    /// 원본 메시지
    pub message: String,
    /// 로그 레벨 (알 수 없으면 None)
    #[serde(default)]
    pub level: Option<LogLevel>,
    /// 발생 서비스명
    #[serde(default)]
    pub service: Option<String>,
    /// 수집 시각
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// 추가 필드
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl LogRecord {
    /// 메시지만으로 레코드를 생성합니다. 나머지 필드는 비어 있습니다.
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            level: None,
            service: None,
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// 로그 레벨을 지정합니다.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// 서비스명을 지정합니다.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            Some(level) => write!(f, "[{}] {}: {}", level, self.id, self.message),
            None => write!(f, "{}: {}", self.id, self.message),
        }
    }
}

/// 로그 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// 문자열에서 로그 레벨을 파싱합니다.
    ///
    /// 대소문자를 구분하지 않으며 흔한 별칭(`warning`, `err`, `critical`)을 허용합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" | "information" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "err" => Some(Self::Error),
            "fatal" | "critical" | "crit" => Some(Self::Fatal),
            _ => None,
        }
    }

    /// 소문자 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 알림 심각도
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    #[default]
    Medium,
    /// 높은 심각도
    High,
    /// 치명적 -- 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 소문자 이름을 반환합니다. 메트릭 레이블 값으로 사용됩니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_display() {
        assert_eq!(Severity::Low.to_string(), "Low");
        assert_eq!(Severity::Critical.to_string(), "Critical");
        assert_eq!(Severity::High.as_str(), "high");
    }

    #[test]
    fn severity_from_str_loose() {
        assert_eq!(
            Severity::from_str_loose("CRITICAL"),
            Some(Severity::Critical)
        );
        assert_eq!(Severity::from_str_loose("Med"), Some(Severity::Medium));
        assert_eq!(Severity::from_str_loose("crit"), Some(Severity::Critical));
        assert_eq!(Severity::from_str_loose("unknown"), None);
    }

    #[test]
    fn severity_deserializes_lowercase() {
        let severity: Severity = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(severity, Severity::High);
        assert_eq!(serde_json::to_string(&Severity::Low).unwrap(), "\"low\"");
    }

    #[test]
    fn log_level_from_str_loose() {
        assert_eq!(LogLevel::from_str_loose("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str_loose("err"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str_loose("critical"), Some(LogLevel::Fatal));
        assert_eq!(LogLevel::from_str_loose("loud"), None);
    }

    #[test]
    fn log_record_builder_and_display() {
        let record = LogRecord::new("log-1", "connection refused")
            .with_level(LogLevel::Error)
            .with_service("api");
        assert_eq!(record.service.as_deref(), Some("api"));
        let display = record.to_string();
        assert!(display.contains("[error]"));
        assert!(display.contains("connection refused"));
    }

    #[test]
    fn log_record_deserializes_with_defaults() {
        let record: LogRecord =
            serde_json::from_str(r#"{"id":"a","message":"hello"}"#).unwrap();
        assert_eq!(record.level, None);
        assert!(record.metadata.is_empty());
    }
}
