//! 분류 파이프라인 -- 캐시, 휴리스틱, provider 에스컬레이션, 결과 저장을 조합합니다.
//!
//! # 처리 흐름
//! ```text
//! analyze(log_id, message, context)
//!   -> cache lookup (key = log_id + 메시지 접두 digest)
//!   -> HeuristicEngine::classify
//!   -> mode/신뢰도에 따라 AnalysisProvider 호출 (blend 또는 fallback)
//!   -> cache set (log 태그 포함)
//!   -> LogStore 비동기 갱신 (fire-and-forget)
//! ```

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use logwarden_cache::CacheStore;
use logwarden_core::metrics as m;
use logwarden_core::types::LogRecord;

use crate::config::{ClassifierConfig, ClassifierMode};
use crate::error::ClassifierError;
use crate::provider::{AnalysisProvider, AnalysisRequest, HttpAnalysisProvider};
use crate::result::{
    AnalysisContext, AnalysisResult, ESCALATION_THRESHOLD, TAG_AI_FALLBACK, TAG_HIGH_CONFIDENCE,
    blend_results, provider_result,
};
use crate::rule::HeuristicEngine;
use crate::store::{ClassificationUpdate, HttpLogStore, LogStore};

/// 캐시에 저장되는 분석 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedAnalysis {
    result: AnalysisResult,
    cached_at: DateTime<Utc>,
}

/// 분석 결과 캐시 키
///
/// `analysis:{log_id}:{sha256(메시지 앞 prefix_chars 글자)}` 형식입니다.
pub fn cache_key(log_id: &str, message: &str, prefix_chars: usize) -> String {
    let prefix: String = message.chars().take(prefix_chars).collect();
    let digest = Sha256::digest(prefix.as_bytes());
    format!("analysis:{log_id}:{digest:x}")
}

/// 로그 ID별 캐시 태그
pub fn log_tag(log_id: &str) -> String {
    format!("log:{log_id}")
}

/// 하이브리드 분류 파이프라인
///
/// `analyze()`는 `&self`로 동작하므로 `Arc`로 감싸 여러 태스크에서 동시에 호출할 수 있습니다.
/// 공유 가변 자원은 캐시뿐입니다.
///
/// # 사용 예시
/// ```ignore
/// let pipeline = ClassificationPipelineBuilder::new()
///     .config(config)
///     .cache(Arc::new(cache))
///     .build()
///     .await?;
///
/// let result = pipeline.analyze("log-42", "connection refused by postgres", &context).await;
/// ```
pub struct ClassificationPipeline<C: CacheStore> {
    config: ClassifierConfig,
    heuristics: HeuristicEngine,
    cache: Arc<C>,
    provider: Option<Arc<dyn AnalysisProvider>>,
    store: Option<Arc<dyn LogStore>>,
}

impl<C: CacheStore> ClassificationPipeline<C> {
    /// 로그 메시지를 분류합니다. 실패하지 않습니다.
    ///
    /// 같은 `(log_id, message)`는 캐시 TTL 동안 같은 결과를 반환합니다.
    pub async fn analyze(
        &self,
        log_id: &str,
        message: &str,
        context: &AnalysisContext,
    ) -> AnalysisResult {
        let started = Instant::now();
        let key = cache_key(log_id, message, self.config.cache_key_prefix_chars);

        if let Some(cached) = self.lookup_cache(&key).await {
            tracing::debug!(log_id, classification = %cached.classification, "analysis cache hit");
            return cached;
        }

        let mut result = self.compute(log_id, message, context).await;
        result.processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        metrics::counter!(m::CLASSIFIER_ANALYSES_TOTAL, m::LABEL_SOURCE => result.source.as_str())
            .increment(1);
        metrics::histogram!(m::CLASSIFIER_ANALYSIS_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        self.store_cache(&key, log_id, &result).await;
        self.persist(log_id, &result);

        tracing::debug!(
            log_id,
            classification = %result.classification,
            confidence = %result.confidence,
            source = %result.source,
            "log analyzed"
        );
        result
    }

    /// 로그 레코드를 분류합니다.
    pub async fn analyze_record(&self, record: &LogRecord) -> AnalysisResult {
        let context = AnalysisContext::from(record);
        self.analyze(&record.id, &record.message, &context).await
    }

    /// 로그 ID에 해당하는 캐시 항목을 모두 제거하고 제거된 수를 반환합니다.
    pub async fn invalidate_log(&self, log_id: &str) -> Result<usize, ClassifierError> {
        Ok(self.cache.invalidate_by_tag(&log_tag(log_id)).await?)
    }

    /// 동작 모드
    pub fn mode(&self) -> ClassifierMode {
        self.config.mode
    }

    /// 휴리스틱 엔진
    pub fn heuristics(&self) -> &HeuristicEngine {
        &self.heuristics
    }

    /// provider 설정 여부
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    async fn compute(
        &self,
        log_id: &str,
        message: &str,
        context: &AnalysisContext,
    ) -> AnalysisResult {
        let mut heuristic = self.heuristics.classify(message, context.level);
        let confident = heuristic.confidence.value() >= ESCALATION_THRESHOLD;

        let provider = match (self.config.mode, &self.provider) {
            (ClassifierMode::Heuristic, _) | (_, None) => None,
            (ClassifierMode::Hybrid, Some(_)) if confident => None,
            (_, Some(provider)) => Some(provider),
        };

        let Some(provider) = provider else {
            if confident {
                heuristic.add_tag(TAG_HIGH_CONFIDENCE);
            }
            return heuristic;
        };

        let request = AnalysisRequest {
            log_id,
            message,
            context,
            heuristic: &heuristic,
        };
        match provider.analyze(&request).await {
            Ok(ai) => match self.config.mode {
                ClassifierMode::Ai => provider_result(&heuristic, &ai),
                _ => blend_results(&heuristic, &ai),
            },
            Err(e) => {
                metrics::counter!(m::CLASSIFIER_PROVIDER_FAILURES_TOTAL).increment(1);
                tracing::warn!(
                    log_id,
                    provider = provider.name(),
                    error = %e,
                    "analysis provider failed, falling back to heuristic result"
                );
                heuristic.add_tag(TAG_AI_FALLBACK);
                heuristic
            }
        }
    }

    async fn lookup_cache(&self, key: &str) -> Option<AnalysisResult> {
        match self.cache.get_json::<CachedAnalysis>(key).await {
            Ok(Some(entry)) if self.is_fresh(&entry) => {
                metrics::counter!(m::CLASSIFIER_CACHE_HITS_TOTAL).increment(1);
                Some(entry.result)
            }
            Ok(_) => {
                metrics::counter!(m::CLASSIFIER_CACHE_MISSES_TOTAL).increment(1);
                None
            }
            Err(e) => {
                metrics::counter!(m::CLASSIFIER_CACHE_MISSES_TOTAL).increment(1);
                tracing::warn!(key, error = %e, "analysis cache lookup failed");
                None
            }
        }
    }

    /// 저장소가 TTL을 지원하지 않아도 오래된 결과를 쓰지 않도록 저장 시각을 확인합니다.
    fn is_fresh(&self, entry: &CachedAnalysis) -> bool {
        match Utc::now().signed_duration_since(entry.cached_at).to_std() {
            Ok(age) => age < self.config.cache_ttl,
            // 저장 시각이 미래 (시계 차이)
            Err(_) => true,
        }
    }

    async fn store_cache(&self, key: &str, log_id: &str, result: &AnalysisResult) {
        let entry = CachedAnalysis {
            result: result.clone(),
            cached_at: Utc::now(),
        };
        let encoded = match serde_json::to_string(&entry) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to encode analysis for cache");
                return;
            }
        };
        let tags = [log_tag(log_id)];
        if let Err(e) = self
            .cache
            .set_with_tags(key, &encoded, &tags, Some(self.config.cache_ttl))
            .await
        {
            tracing::warn!(key, error = %e, "failed to cache analysis");
        }
    }

    fn persist(&self, log_id: &str, result: &AnalysisResult) {
        let Some(store) = &self.store else {
            return;
        };
        let store = Arc::clone(store);
        let log_id = log_id.to_owned();
        let update = ClassificationUpdate::from(result);
        tokio::spawn(async move {
            if let Err(e) = store.update_classification(&log_id, &update).await {
                metrics::counter!(m::CLASSIFIER_PERSIST_FAILURES_TOTAL).increment(1);
                tracing::warn!(log_id = %log_id, error = %e, "failed to persist classification");
            }
        });
    }
}

/// 분류 파이프라인 빌더
pub struct ClassificationPipelineBuilder<C> {
    config: ClassifierConfig,
    cache: Option<Arc<C>>,
    heuristics: Option<HeuristicEngine>,
    provider: Option<Arc<dyn AnalysisProvider>>,
    store: Option<Arc<dyn LogStore>>,
}

impl<C: CacheStore> ClassificationPipelineBuilder<C> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: ClassifierConfig::default(),
            cache: None,
            heuristics: None,
            provider: None,
            store: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: ClassifierConfig) -> Self {
        self.config = config;
        self
    }

    /// 캐시 저장소를 지정합니다 (필수).
    pub fn cache(mut self, cache: Arc<C>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// 미리 구성된 휴리스틱 엔진을 지정합니다.
    ///
    /// 지정하지 않으면 설정에 따라 내장 규칙으로 엔진을 만듭니다.
    pub fn heuristics(mut self, engine: HeuristicEngine) -> Self {
        self.heuristics = Some(engine);
        self
    }

    /// 분석 provider를 지정합니다. 설정의 HTTP provider보다 우선합니다.
    pub fn provider(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// 문서 저장소를 지정합니다. 설정의 HTTP 저장소보다 우선합니다.
    pub fn store(mut self, store: Arc<dyn LogStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 파이프라인을 빌드합니다. 규칙 디렉토리가 설정되어 있으면 여기서 로드합니다.
    pub async fn build(self) -> Result<ClassificationPipeline<C>, ClassifierError> {
        self.config.validate()?;

        let cache = self.cache.ok_or_else(|| ClassifierError::Config {
            field: "cache".to_owned(),
            reason: "cache store is required".to_owned(),
        })?;

        let mut heuristics = match self.heuristics {
            Some(engine) => engine,
            None if self.config.builtin_rules => HeuristicEngine::with_builtin_rules()?,
            None => HeuristicEngine::new(),
        };
        if let Some(dir) = &self.config.rule_dir {
            let loaded = heuristics.load_rules_from_dir(dir).await?;
            tracing::info!(dir = %dir.display(), loaded, "custom heuristic rules loaded");
        }

        let provider = match (self.provider, &self.config.provider) {
            (Some(provider), _) => Some(provider),
            (None, Some(settings)) => {
                Some(Arc::new(HttpAnalysisProvider::new(settings)?) as Arc<dyn AnalysisProvider>)
            }
            (None, None) => None,
        };
        if self.config.mode == ClassifierMode::Ai && provider.is_none() {
            return Err(ClassifierError::Config {
                field: "mode".to_owned(),
                reason: "mode 'ai' requires an analysis provider".to_owned(),
            });
        }

        let store = match (self.store, &self.config.store) {
            (Some(store), _) => Some(store),
            (None, Some(settings)) => {
                Some(Arc::new(HttpLogStore::new(settings)?) as Arc<dyn LogStore>)
            }
            (None, None) => None,
        };

        tracing::info!(
            mode = %self.config.mode,
            rules = heuristics.rule_count(),
            provider = provider.is_some(),
            store = store.is_some(),
            cache_ttl_secs = self.config.cache_ttl.as_secs(),
            "classification pipeline built"
        );

        Ok(ClassificationPipeline {
            config: self.config,
            heuristics,
            cache,
            provider,
            store,
        })
    }
}

impl<C: CacheStore> Default for ClassificationPipelineBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}
