//! 문서 저장소 -- 분류 결과를 원본 로그 문서에 기록
//!
//! 분류 성공 후 비동기로 호출되며, 실패는 기록만 하고 `analyze()` 결과에 영향을 주지 않습니다.

use chrono::{DateTime, Utc};
use logwarden_core::pipeline::BoxFuture;
use serde::Serialize;

use crate::config::StoreSettings;
use crate::error::ClassifierError;
use crate::result::{AnalysisResult, AnalysisSource};

/// 로그 문서에 기록되는 분류 필드
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationUpdate {
    /// 분류명
    pub classification: String,
    /// 분류 근거
    pub explanation: String,
    /// 조치 제안
    pub suggestion: String,
    /// 신뢰도
    pub confidence: f64,
    /// 결과 출처
    pub source: AnalysisSource,
    /// 태그
    pub tags: Vec<String>,
    /// 분류 시각
    pub classified_at: DateTime<Utc>,
}

impl From<&AnalysisResult> for ClassificationUpdate {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            classification: result.classification.clone(),
            explanation: result.explanation.clone(),
            suggestion: result.suggestion.clone(),
            confidence: result.confidence.value(),
            source: result.source,
            tags: result.tags.iter().cloned().collect(),
            classified_at: Utc::now(),
        }
    }
}

/// 로그 문서 저장소
pub trait LogStore: Send + Sync {
    /// ID로 로그 문서를 찾아 분류 필드를 갱신합니다.
    fn update_classification<'a>(
        &'a self,
        log_id: &'a str,
        update: &'a ClassificationUpdate,
    ) -> BoxFuture<'a, Result<(), ClassifierError>>;
}

/// HTTP 문서 저장소
///
/// `PATCH {base_url}/logs/{log_id}`로 분류 필드를 JSON으로 보냅니다.
#[derive(Debug)]
pub struct HttpLogStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpLogStore {
    /// 설정으로 저장소 클라이언트를 생성합니다.
    pub fn new(settings: &StoreSettings) -> Result<Self, ClassifierError> {
        if settings.base_url.is_empty() {
            return Err(ClassifierError::Config {
                field: "store.base_url".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            client,
        })
    }

    /// 로그 문서 URL
    pub fn log_url(&self, log_id: &str) -> String {
        format!("{}/logs/{}", self.base_url, log_id)
    }

    async fn patch(
        &self,
        log_id: &str,
        update: &ClassificationUpdate,
    ) -> Result<(), ClassifierError> {
        let url = self.log_url(log_id);
        let response = self.client.patch(&url).json(update).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Store(format!(
                "PATCH {url} returned {status}"
            )));
        }
        tracing::debug!(log_id, "log classification persisted");
        Ok(())
    }
}

impl LogStore for HttpLogStore {
    fn update_classification<'a>(
        &'a self,
        log_id: &'a str,
        update: &'a ClassificationUpdate,
    ) -> BoxFuture<'a, Result<(), ClassifierError>> {
        Box::pin(self.patch(log_id, update))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn log_url_trims_trailing_slash() {
        let store = HttpLogStore::new(&StoreSettings {
            base_url: "http://docs.local/api/".to_owned(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(store.log_url("abc"), "http://docs.local/api/logs/abc");
    }

    #[test]
    fn empty_base_url_rejected() {
        let result = HttpLogStore::new(&StoreSettings {
            base_url: String::new(),
            timeout: Duration::from_secs(1),
        });
        assert!(result.is_err());
    }

    #[test]
    fn update_from_result() {
        let result = AnalysisResult {
            classification: "Disk Full".to_owned(),
            explanation: "no space".to_owned(),
            suggestion: "free space".to_owned(),
            confidence: 0.7.into(),
            source: AnalysisSource::Heuristic,
            tags: ["storage".to_owned()].into_iter().collect(),
            processing_time_ms: 1,
        };
        let update = ClassificationUpdate::from(&result);
        assert_eq!(update.tags, vec!["storage".to_owned()]);
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["source"], "heuristic");
        assert_eq!(json["classification"], "Disk Full");
    }
}
