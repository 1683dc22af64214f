//! 규칙 매칭 로직 -- 정규식 컴파일 캐싱
//!
//! [`RuleMatcher`]는 규칙 추가 시 패턴을 한 번만 컴파일하여 보관합니다.

use std::collections::HashMap;

use regex::Regex;

use super::types::HeuristicRule;
use crate::error::ClassifierError;

/// 정규식 매처
pub struct RuleMatcher {
    /// 컴파일된 정규식: rule_id -> Regex
    compiled: HashMap<String, Regex>,
}

impl RuleMatcher {
    /// 새 매처를 생성합니다.
    pub fn new() -> Self {
        Self {
            compiled: HashMap::new(),
        }
    }

    /// 규칙의 패턴을 컴파일합니다.
    ///
    /// 잘못된 정규식은 [`ClassifierError::RuleValidation`]으로 거부됩니다.
    pub fn compile_rule(&mut self, rule: &HeuristicRule) -> Result<(), ClassifierError> {
        let regex = Regex::new(&rule.pattern).map_err(|e| ClassifierError::RuleValidation {
            rule_id: rule.id.clone(),
            reason: format!("invalid pattern: {e}"),
        })?;
        self.compiled.insert(rule.id.clone(), regex);
        Ok(())
    }

    /// 규칙 제거 시 캐시를 정리합니다.
    pub fn remove_rule(&mut self, rule_id: &str) {
        self.compiled.remove(rule_id);
    }

    /// 규칙 패턴이 메시지에 매칭되는지 평가합니다. 컴파일되지 않은 규칙은 매칭되지 않습니다.
    pub fn matches(&self, rule: &HeuristicRule, message: &str) -> bool {
        self.compiled
            .get(&rule.id)
            .is_some_and(|regex| regex.is_match(message))
    }
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_rule(id: &str, pattern: &str) -> HeuristicRule {
        HeuristicRule {
            id: id.to_owned(),
            pattern: pattern.to_owned(),
            level: None,
            classification: "Test".to_owned(),
            explanation: String::new(),
            suggestion: String::new(),
            priority_rank: 1,
            tags: vec![],
        }
    }

    #[test]
    fn regex_match() {
        let mut matcher = RuleMatcher::new();
        let rule = make_rule("refused", r"(?i)connection refused");
        matcher.compile_rule(&rule).unwrap();
        assert!(matcher.matches(&rule, "ERROR: Connection REFUSED by 10.0.0.5:5432"));
        assert!(!matcher.matches(&rule, "connection established"));
    }

    #[test]
    fn invalid_regex_rejected() {
        let mut matcher = RuleMatcher::new();
        let rule = make_rule("broken", "([unclosed");
        let err = matcher.compile_rule(&rule).unwrap_err();
        assert!(matches!(err, ClassifierError::RuleValidation { .. }));
    }

    #[test]
    fn removed_rule_no_longer_matches() {
        let mut matcher = RuleMatcher::new();
        let rule = make_rule("any", ".*");
        matcher.compile_rule(&rule).unwrap();
        assert!(matcher.matches(&rule, "x"));
        matcher.remove_rule("any");
        assert!(!matcher.matches(&rule, "x"));
    }
}
