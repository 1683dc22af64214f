//! 분류 결과 타입
//!
//! [`AnalysisResult`]는 캐시에 JSON으로 저장되고 그대로 재사용되므로
//! 모든 필드가 직렬화 가능해야 합니다.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use logwarden_core::types::{LogLevel, LogRecord};
use serde::{Deserialize, Serialize};

/// provider 호출에 실패했을 때 붙는 태그
pub const TAG_AI_FALLBACK: &str = "ai-fallback";

/// 휴리스틱 신뢰도가 충분해 provider를 호출하지 않았을 때 붙는 태그
pub const TAG_HIGH_CONFIDENCE: &str = "high-confidence";

/// 매칭되는 규칙이 없을 때의 분류명
pub const UNCLASSIFIED: &str = "Unclassified";

/// 이 값 이상이면 provider로 에스컬레이션하지 않음
pub const ESCALATION_THRESHOLD: f64 = 0.7;

/// 혼합 결과의 최대 신뢰도
pub const BLEND_CAP: f64 = 0.95;

/// [0, 1] 범위로 고정되는 신뢰도
///
/// NaN은 0으로 취급합니다.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    /// 값을 [0, 1]로 고정하여 생성합니다.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// 내부 값
    pub fn value(self) -> f64 {
        self.0
    }
}

impl From<f64> for Confidence {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// 결과 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    /// 휴리스틱 규칙
    Heuristic,
    /// 분석 provider
    Ai,
    /// 휴리스틱과 provider 혼합
    Hybrid,
}

impl AnalysisSource {
    /// 소문자 이름. 메트릭 레이블 값으로 사용됩니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Ai => "ai",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for AnalysisSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 분류 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// 분류명
    pub classification: String,
    /// 분류 근거
    pub explanation: String,
    /// 조치 제안
    pub suggestion: String,
    /// 신뢰도
    pub confidence: Confidence,
    /// 결과 출처
    pub source: AnalysisSource,
    /// 태그 (중복 없음)
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// 처리 시간 (밀리초)
    pub processing_time_ms: u64,
}

impl AnalysisResult {
    /// 태그를 추가합니다.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    /// 태그 보유 여부
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// 분류되지 않은 결과인지 확인합니다.
    pub fn is_unclassified(&self) -> bool {
        self.classification == UNCLASSIFIED
    }
}

/// 분석 컨텍스트 -- 메시지 외에 분류에 쓰이는 정보
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    /// 로그 레벨 (규칙의 레벨 필터에 사용)
    #[serde(default)]
    pub level: Option<LogLevel>,
    /// 서비스명
    #[serde(default)]
    pub service: Option<String>,
    /// 추가 필드
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl AnalysisContext {
    /// 레벨만 지정된 컨텍스트
    pub fn with_level(level: LogLevel) -> Self {
        Self {
            level: Some(level),
            ..Self::default()
        }
    }
}

impl From<&LogRecord> for AnalysisContext {
    fn from(record: &LogRecord) -> Self {
        Self {
            level: record.level,
            service: record.service.clone(),
            metadata: record.metadata.clone(),
        }
    }
}

/// provider가 돌려준 분석
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderAnalysis {
    /// 분류명 (없으면 휴리스틱 결과 사용)
    #[serde(default)]
    pub classification: Option<String>,
    /// 분류 근거
    #[serde(default)]
    pub explanation: Option<String>,
    /// 조치 제안 (없으면 휴리스틱 결과 사용)
    #[serde(default)]
    pub suggestion: Option<String>,
    /// 신뢰도
    pub confidence: f64,
    /// 추가 태그
    #[serde(default)]
    pub tags: Vec<String>,
}

/// 휴리스틱 결과와 provider 결과를 혼합합니다.
///
/// 신뢰도는 `min(0.95, h × 0.4 + ai × 0.6)`입니다.
/// 분류명과 제안은 provider 값이 있으면 우선하고, 근거는 둘을 이어 붙이며, 태그는 합집합입니다.
pub fn blend_results(heuristic: &AnalysisResult, ai: &ProviderAnalysis) -> AnalysisResult {
    let ai_confidence = Confidence::new(ai.confidence).value();
    let combined = (heuristic.confidence.value() * 0.4 + ai_confidence * 0.6).min(BLEND_CAP);

    let explanation = match ai.explanation.as_deref().filter(|e| !e.is_empty()) {
        Some(ai_explanation) if heuristic.explanation.is_empty() => ai_explanation.to_owned(),
        Some(ai_explanation) => format!("{} {}", heuristic.explanation, ai_explanation),
        None => heuristic.explanation.clone(),
    };

    let mut tags = heuristic.tags.clone();
    tags.extend(ai.tags.iter().cloned());

    AnalysisResult {
        classification: non_empty(&ai.classification)
            .unwrap_or_else(|| heuristic.classification.clone()),
        explanation,
        suggestion: non_empty(&ai.suggestion).unwrap_or_else(|| heuristic.suggestion.clone()),
        confidence: Confidence::new(combined),
        source: AnalysisSource::Hybrid,
        tags,
        processing_time_ms: heuristic.processing_time_ms,
    }
}

/// provider 결과만으로 결과를 만듭니다. 빈 필드는 휴리스틱 값으로 채웁니다.
pub fn provider_result(heuristic: &AnalysisResult, ai: &ProviderAnalysis) -> AnalysisResult {
    let mut tags: BTreeSet<String> = ai.tags.iter().cloned().collect();
    tags.extend(
        heuristic
            .tags
            .iter()
            .filter(|t| t.as_str() != TAG_HIGH_CONFIDENCE)
            .cloned(),
    );
    AnalysisResult {
        classification: non_empty(&ai.classification)
            .unwrap_or_else(|| heuristic.classification.clone()),
        explanation: non_empty(&ai.explanation).unwrap_or_else(|| heuristic.explanation.clone()),
        suggestion: non_empty(&ai.suggestion).unwrap_or_else(|| heuristic.suggestion.clone()),
        confidence: Confidence::new(ai.confidence),
        source: AnalysisSource::Ai,
        tags,
        processing_time_ms: heuristic.processing_time_ms,
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn heuristic(confidence: f64) -> AnalysisResult {
        AnalysisResult {
            classification: "Database Error".to_owned(),
            explanation: "connection refused by database".to_owned(),
            suggestion: "check database availability".to_owned(),
            confidence: Confidence::new(confidence),
            source: AnalysisSource::Heuristic,
            tags: ["database".to_owned()].into_iter().collect(),
            processing_time_ms: 2,
        }
    }

    #[test]
    fn blend_weights_heuristic_and_ai() {
        let ai = ProviderAnalysis {
            confidence: 0.9,
            ..ProviderAnalysis::default()
        };
        let blended = blend_results(&heuristic(0.5), &ai);
        assert!((blended.confidence.value() - 0.74).abs() < 1e-9);
        assert_eq!(blended.source, AnalysisSource::Hybrid);
        assert_eq!(blended.classification, "Database Error");
    }

    #[test]
    fn blend_is_capped() {
        let ai = ProviderAnalysis {
            confidence: 1.0,
            ..ProviderAnalysis::default()
        };
        let blended = blend_results(&heuristic(1.0), &ai);
        assert!((blended.confidence.value() - BLEND_CAP).abs() < 1e-9);
    }

    #[test]
    fn blend_prefers_ai_fields_and_unions_tags() {
        let ai = ProviderAnalysis {
            classification: Some("Connection Pool Exhausted".to_owned()),
            explanation: Some("pool size reached".to_owned()),
            suggestion: Some("raise pool size".to_owned()),
            confidence: 0.8,
            tags: vec!["database".to_owned(), "capacity".to_owned()],
        };
        let blended = blend_results(&heuristic(0.3), &ai);
        assert_eq!(blended.classification, "Connection Pool Exhausted");
        assert_eq!(blended.suggestion, "raise pool size");
        assert_eq!(
            blended.explanation,
            "connection refused by database pool size reached"
        );
        let tags: Vec<_> = blended.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["capacity", "database"]);
    }

    #[test]
    fn blend_keeps_heuristic_fields_when_ai_is_empty() {
        let ai = ProviderAnalysis {
            classification: Some(String::new()),
            confidence: 0.6,
            ..ProviderAnalysis::default()
        };
        let blended = blend_results(&heuristic(0.3), &ai);
        assert_eq!(blended.classification, "Database Error");
        assert_eq!(blended.suggestion, "check database availability");
    }

    #[test]
    fn confidence_nan_is_zero() {
        assert_eq!(Confidence::new(f64::NAN).value(), 0.0);
    }

    #[test]
    fn confidence_deserializes_clamped() {
        let c: Confidence = serde_json::from_str("1.7").unwrap();
        assert_eq!(c.value(), 1.0);
    }

    #[test]
    fn result_roundtrips_through_json() {
        let result = heuristic(0.8);
        let json = serde_json::to_string(&result).unwrap();
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    proptest! {
        #[test]
        fn confidence_always_in_unit_range(value in proptest::num::f64::ANY) {
            let c = Confidence::new(value).value();
            prop_assert!((0.0..=1.0).contains(&c));
        }

        #[test]
        fn blended_confidence_never_exceeds_cap(h in -10.0f64..10.0, a in -10.0f64..10.0) {
            let ai = ProviderAnalysis { confidence: a, ..ProviderAnalysis::default() };
            let blended = blend_results(&heuristic(h), &ai);
            prop_assert!(blended.confidence.value() <= BLEND_CAP);
            prop_assert!(blended.confidence.value() >= 0.0);
        }
    }
}
