//! 휴리스틱 규칙 엔진 -- YAML 기반 메시지 분류
//!
//! 정규식 패턴 규칙을 로드하여 로그 메시지를 분류합니다.
//! 모든 규칙을 평가한 뒤 매칭된 규칙을 `priority_rank` 오름차순으로 정렬하고,
//! 가장 강한 규칙이 분류명/근거/제안을 결정합니다.
//!
//! # 아키텍처
//! - [`HeuristicEngine`]: 규칙 관리 및 분류 코디네이터
//! - [`loader`]: YAML 파일 로딩 및 유효성 검증
//! - [`matcher`]: 정규식 컴파일 캐싱
//! - [`types`]: 규칙 데이터 구조 정의

pub mod loader;
pub mod matcher;
pub mod types;

pub use loader::RuleLoader;
pub use matcher::RuleMatcher;
pub use types::HeuristicRule;

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Instant;

use logwarden_core::types::LogLevel;

use crate::error::ClassifierError;
use crate::result::{AnalysisResult, AnalysisSource, Confidence, UNCLASSIFIED};

// 신뢰도는 0.1 단위 정수로 계산한 뒤 나눔 (0.7 + 0.1 == 0.7999.. 방지)
/// 첫 매칭의 신뢰도 (0.1 단위)
const BASE_MATCH_TENTHS: usize = 7;
/// 매칭이 없을 때의 신뢰도
const NO_MATCH_CONFIDENCE: f64 = 0.3;

/// 내장 기본 규칙 (파일명, YAML)
const BUILTIN_RULES: &[(&str, &str)] = &[
    ("out_of_memory.yml", include_str!("../../rules/out_of_memory.yml")),
    ("disk_full.yml", include_str!("../../rules/disk_full.yml")),
    ("database_connection.yml", include_str!("../../rules/database_connection.yml")),
    ("null_reference.yml", include_str!("../../rules/null_reference.yml")),
    ("authentication_failure.yml", include_str!("../../rules/authentication_failure.yml")),
    ("permission_denied.yml", include_str!("../../rules/permission_denied.yml")),
    ("timeout.yml", include_str!("../../rules/timeout.yml")),
    ("rate_limited.yml", include_str!("../../rules/rate_limited.yml")),
    ("network_unreachable.yml", include_str!("../../rules/network_unreachable.yml")),
    ("unhandled_exception.yml", include_str!("../../rules/unhandled_exception.yml")),
    ("server_error.yml", include_str!("../../rules/server_error.yml")),
];

/// 내장 기본 규칙을 파싱합니다.
pub fn builtin_rules() -> Result<Vec<HeuristicRule>, ClassifierError> {
    BUILTIN_RULES
        .iter()
        .map(|(name, yaml)| RuleLoader::parse_yaml(yaml, name))
        .collect()
}

/// 매칭 수에 따른 휴리스틱 신뢰도
///
/// `0.7 + 0.1 × (n − 1)`, 최대 1.0. 매칭이 없으면 0.3.
pub fn heuristic_confidence(match_count: usize) -> Confidence {
    if match_count == 0 {
        return Confidence::new(NO_MATCH_CONFIDENCE);
    }
    let tenths = BASE_MATCH_TENTHS.saturating_add(match_count - 1).min(10);
    Confidence::new(tenths as f64 / 10.0)
}

/// 휴리스틱 규칙 엔진
///
/// 평가 중에는 규칙을 읽기만 하므로 `&self`로 동시에 여러 메시지를 분류할 수 있습니다.
///
/// # 사용 예시
/// ```ignore
/// let mut engine = HeuristicEngine::with_builtin_rules()?;
/// engine.load_rules_from_dir("/etc/logwarden/rules").await?;
///
/// let result = engine.classify("connection refused by postgres", Some(LogLevel::Error));
/// ```
pub struct HeuristicEngine {
    /// 규칙 목록 (ID -> 규칙)
    rules: HashMap<String, HeuristicRule>,
    /// 컴파일된 매처
    matcher: RuleMatcher,
}

impl HeuristicEngine {
    /// 규칙 없는 엔진을 생성합니다.
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
            matcher: RuleMatcher::new(),
        }
    }

    /// 내장 기본 규칙을 가진 엔진을 생성합니다.
    pub fn with_builtin_rules() -> Result<Self, ClassifierError> {
        let mut engine = Self::new();
        for rule in builtin_rules()? {
            engine.add_rule(rule)?;
        }
        Ok(engine)
    }

    /// 디렉토리에서 YAML 규칙 파일을 로드합니다. 같은 ID의 기존 규칙은 교체됩니다.
    pub async fn load_rules_from_dir(
        &mut self,
        dir: impl AsRef<Path>,
    ) -> Result<usize, ClassifierError> {
        let rules = RuleLoader::load_directory(dir).await?;
        let mut loaded = 0;
        for rule in rules {
            let rule_id = rule.id.clone();
            match self.add_rule(rule) {
                Ok(()) => loaded += 1,
                Err(e) => tracing::warn!(rule_id = %rule_id, error = %e, "rejected heuristic rule"),
            }
        }
        Ok(loaded)
    }

    /// 규칙을 추가합니다. 패턴은 여기서 한 번 컴파일됩니다.
    pub fn add_rule(&mut self, rule: HeuristicRule) -> Result<(), ClassifierError> {
        rule.validate()?;
        self.matcher.compile_rule(&rule)?;
        tracing::debug!(rule_id = %rule.id, rank = rule.priority_rank, "heuristic rule added");
        self.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    /// 규칙을 제거합니다.
    pub fn remove_rule(&mut self, rule_id: &str) -> Option<HeuristicRule> {
        self.matcher.remove_rule(rule_id);
        self.rules.remove(rule_id)
    }

    /// 현재 로드된 규칙 수
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 규칙 조회
    pub fn get_rule(&self, rule_id: &str) -> Option<&HeuristicRule> {
        self.rules.get(rule_id)
    }

    /// 메시지에 매칭되는 규칙을 강한 순서로 반환합니다.
    ///
    /// 같은 `priority_rank`끼리는 ID 순서로 정렬합니다.
    pub fn evaluate(&self, message: &str, level: Option<LogLevel>) -> Vec<&HeuristicRule> {
        let mut matches: Vec<&HeuristicRule> = self
            .rules
            .values()
            .filter(|rule| rule.accepts_level(level) && self.matcher.matches(rule, message))
            .collect();
        matches.sort_by(|a, b| {
            a.priority_rank
                .cmp(&b.priority_rank)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches
    }

    /// 메시지를 분류합니다.
    pub fn classify(&self, message: &str, level: Option<LogLevel>) -> AnalysisResult {
        let started = Instant::now();
        let matches = self.evaluate(message, level);
        let confidence = heuristic_confidence(matches.len());

        let mut result = match matches.first() {
            Some(top) => AnalysisResult {
                classification: top.classification.clone(),
                explanation: top.explanation.clone(),
                suggestion: top.suggestion.clone(),
                confidence,
                source: AnalysisSource::Heuristic,
                tags: matches
                    .iter()
                    .flat_map(|rule| rule.tags.iter().cloned())
                    .collect::<BTreeSet<_>>(),
                processing_time_ms: 0,
            },
            None => AnalysisResult {
                classification: UNCLASSIFIED.to_owned(),
                explanation: "No heuristic rule matched this message.".to_owned(),
                suggestion: "Review the log manually or enable the analysis provider.".to_owned(),
                confidence,
                source: AnalysisSource::Heuristic,
                tags: BTreeSet::new(),
                processing_time_ms: 0,
            },
        };
        result.processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::trace!(
            matches = matches.len(),
            classification = %result.classification,
            confidence = %result.confidence,
            "heuristic classification"
        );
        result
    }
}

impl Default for HeuristicEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, pattern: &str, rank: u32, classification: &str) -> HeuristicRule {
        HeuristicRule {
            id: id.to_owned(),
            pattern: pattern.to_owned(),
            level: None,
            classification: classification.to_owned(),
            explanation: format!("{classification} explanation"),
            suggestion: format!("{classification} suggestion"),
            priority_rank: rank,
            tags: vec![id.to_owned()],
        }
    }

    #[test]
    fn confidence_by_match_count() {
        assert_eq!(heuristic_confidence(0).value(), 0.3);
        assert_eq!(heuristic_confidence(1).value(), 0.7);
        assert_eq!(heuristic_confidence(2).value(), 0.8);
        assert_eq!(heuristic_confidence(3).value(), 0.9);
        assert_eq!(heuristic_confidence(4).value(), 1.0);
        assert_eq!(heuristic_confidence(9).value(), 1.0);
        assert_eq!(heuristic_confidence(usize::MAX).value(), 1.0);
    }

    #[test]
    fn strongest_rank_wins_with_two_matches() {
        let mut engine = HeuristicEngine::new();
        engine.add_rule(rule("weak", "timeout", 2, "Weak")).unwrap();
        engine.add_rule(rule("strong", "timeout", 1, "Strong")).unwrap();

        let result = engine.classify("request timeout after 30s", None);
        assert_eq!(result.classification, "Strong");
        assert_eq!(result.suggestion, "Strong suggestion");
        assert!((result.confidence.value() - 0.8).abs() < 1e-9);
        assert!(result.has_tag("weak") && result.has_tag("strong"));
    }

    #[test]
    fn no_match_is_unclassified() {
        let mut engine = HeuristicEngine::new();
        engine.add_rule(rule("oom", "OutOfMemory", 1, "OOM")).unwrap();
        let result = engine.classify("user logged in", None);
        assert!(result.is_unclassified());
        assert!((result.confidence.value() - 0.3).abs() < 1e-9);
        assert!(result.tags.is_empty());
    }

    #[test]
    fn level_filter_excludes_rule() {
        let mut engine = HeuristicEngine::new();
        let mut r = rule("err_only", "failed", 1, "Failure");
        r.level = Some(LogLevel::Error);
        engine.add_rule(r).unwrap();

        assert!(engine.classify("job failed", Some(LogLevel::Info)).is_unclassified());
        assert!(!engine.classify("job failed", Some(LogLevel::Error)).is_unclassified());
        assert!(!engine.classify("job failed", None).is_unclassified());
    }

    #[test]
    fn invalid_pattern_rejected_at_add() {
        let mut engine = HeuristicEngine::new();
        let result = engine.add_rule(rule("bad", "(unclosed", 1, "Bad"));
        assert!(matches!(result, Err(ClassifierError::RuleValidation { .. })));
        assert_eq!(engine.rule_count(), 0);
    }

    #[test]
    fn remove_rule_stops_matching() {
        let mut engine = HeuristicEngine::new();
        engine.add_rule(rule("t", "timeout", 1, "Timeout")).unwrap();
        assert!(engine.remove_rule("t").is_some());
        assert!(engine.classify("timeout", None).is_unclassified());
    }

    #[test]
    fn builtin_rules_parse_and_compile() {
        let engine = HeuristicEngine::with_builtin_rules().unwrap();
        assert_eq!(engine.rule_count(), BUILTIN_RULES.len());
    }

    #[test]
    fn builtin_rules_classify_common_failures() {
        let engine = HeuristicEngine::with_builtin_rules().unwrap();

        let oom = engine.classify("java.lang.OutOfMemoryError: Java heap space", None);
        assert_eq!(oom.classification, "Memory Exhaustion");

        let disk = engine.classify("write /var/lib/data: no space left on device", None);
        assert_eq!(disk.classification, "Disk Full");

        let db = engine.classify(
            "FATAL: connection refused while connecting to postgres at 10.0.0.3:5432",
            Some(LogLevel::Error),
        );
        assert_eq!(db.classification, "Database Connection Error");
        assert!(db.confidence.value() >= 0.8);
    }
}
