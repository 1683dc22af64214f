//! 휴리스틱 규칙 데이터 타입
//!
//! YAML 규칙 파일에서 역직렬화되는 구조체를 정의합니다.

use logwarden_core::types::LogLevel;
use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;

/// 규칙 ID 최대 길이
const MAX_RULE_ID_LEN: usize = 256;

/// 휴리스틱 분류 규칙 -- 하나의 YAML 규칙 파일에 대응합니다.
///
/// # YAML 스키마
/// ```yaml
/// id: db_connection_refused
/// pattern: "(?i)connection (refused|reset).*(postgres|mysql|database)"
/// level: error
/// classification: Database Connection Error
/// explanation: The application could not reach its database.
/// suggestion: Verify the database is running and reachable.
/// priority_rank: 10
/// tags:
///   - database
///   - connectivity
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeuristicRule {
    /// 규칙 고유 ID
    pub id: String,
    /// 메시지에 적용할 정규식
    pub pattern: String,
    /// 지정하면 같은 레벨의 로그에만 적용
    #[serde(default)]
    pub level: Option<LogLevel>,
    /// 분류명
    pub classification: String,
    /// 분류 근거
    #[serde(default)]
    pub explanation: String,
    /// 조치 제안
    #[serde(default)]
    pub suggestion: String,
    /// 우선순위 (낮을수록 강함)
    #[serde(default = "default_priority_rank")]
    pub priority_rank: u32,
    /// 분류 태그
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_priority_rank() -> u32 {
    100
}

impl HeuristicRule {
    /// 규칙의 유효성을 검증합니다. 정규식 컴파일은 [`RuleMatcher`](super::RuleMatcher)가 담당합니다.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.id.is_empty() {
            return Err(ClassifierError::RuleValidation {
                rule_id: "(empty)".to_owned(),
                reason: "rule id must not be empty".to_owned(),
            });
        }

        if self.id.len() > MAX_RULE_ID_LEN {
            return Err(ClassifierError::RuleValidation {
                rule_id: self.id.clone(),
                reason: format!("rule id must not exceed {MAX_RULE_ID_LEN} characters"),
            });
        }

        if self.pattern.is_empty() {
            return Err(ClassifierError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "pattern must not be empty".to_owned(),
            });
        }

        if self.classification.is_empty() {
            return Err(ClassifierError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "classification must not be empty".to_owned(),
            });
        }

        Ok(())
    }

    /// 레벨 필터가 주어진 로그 레벨을 허용하는지 확인합니다.
    ///
    /// 로그 레벨을 모르면 필터를 적용하지 않습니다.
    pub fn accepts_level(&self, level: Option<LogLevel>) -> bool {
        match (self.level, level) {
            (Some(required), Some(actual)) => required == actual,
            _ => true,
        }
    }
}
