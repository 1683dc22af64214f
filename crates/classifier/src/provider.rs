//! 분석 provider -- 휴리스틱 신뢰도가 낮을 때 호출되는 외부 분석기
//!
//! [`AnalysisProvider`]는 dyn 호환 trait이며, 기본 구현인 [`HttpAnalysisProvider`]는
//! 설정된 엔드포인트로 JSON 요청을 보냅니다.

use std::time::Duration;

use logwarden_core::pipeline::BoxFuture;
use serde::Serialize;

use crate::config::ProviderSettings;
use crate::error::ClassifierError;
use crate::result::{AnalysisContext, AnalysisResult, ProviderAnalysis};

/// provider에 전달되는 분석 요청
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest<'a> {
    /// 로그 ID
    pub log_id: &'a str,
    /// 원본 메시지
    pub message: &'a str,
    /// 분석 컨텍스트
    pub context: &'a AnalysisContext,
    /// 앞서 계산된 휴리스틱 결과
    pub heuristic: &'a AnalysisResult,
}

/// 외부 분석 provider
pub trait AnalysisProvider: Send + Sync {
    /// 로그 메시지를 분석합니다.
    fn analyze<'a>(
        &'a self,
        request: &'a AnalysisRequest<'a>,
    ) -> BoxFuture<'a, Result<ProviderAnalysis, ClassifierError>>;

    /// provider 이름 (로그용)
    fn name(&self) -> &str;
}

/// HTTP JSON 분석 provider
///
/// `POST {endpoint}`로 [`AnalysisRequest`]를 보내고 [`ProviderAnalysis`]를 받습니다.
/// api_key가 있으면 bearer 토큰으로 전달합니다.
#[derive(Debug)]
pub struct HttpAnalysisProvider {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpAnalysisProvider {
    /// 설정으로 provider를 생성합니다.
    pub fn new(settings: &ProviderSettings) -> Result<Self, ClassifierError> {
        if settings.endpoint.is_empty() {
            return Err(ClassifierError::Config {
                field: "provider.endpoint".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout.min(Duration::from_secs(10)))
            .build()?;
        Ok(Self {
            endpoint: settings.endpoint.clone(),
            api_key: (!settings.api_key.is_empty()).then(|| settings.api_key.clone()),
            client,
        })
    }

    /// 요청 엔드포인트
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: &AnalysisRequest<'_>) -> Result<ProviderAnalysis, ClassifierError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_owned());
            return Err(ClassifierError::Provider(format!(
                "provider returned {status}: {body}"
            )));
        }

        let analysis: ProviderAnalysis = response.json().await?;
        tracing::debug!(
            endpoint = %self.endpoint,
            log_id = request.log_id,
            confidence = analysis.confidence,
            "provider analysis received"
        );
        Ok(analysis)
    }
}

impl AnalysisProvider for HttpAnalysisProvider {
    fn analyze<'a>(
        &'a self,
        request: &'a AnalysisRequest<'a>,
    ) -> BoxFuture<'a, Result<ProviderAnalysis, ClassifierError>> {
        Box::pin(self.send(request))
    }

    fn name(&self) -> &str {
        "http"
    }
}
