//! 분류 파이프라인 통합 테스트
//!
//! mock provider/저장소와 메모리 캐시로 모드별 동작, 캐시 재사용, TTL 만료,
//! 비동기 결과 저장을 검증합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use logwarden_cache::MemoryCacheStore;
use logwarden_classifier::{
    AnalysisContext, AnalysisProvider, AnalysisRequest, AnalysisSource, ClassificationPipeline,
    ClassificationPipelineBuilder, ClassificationUpdate, ClassifierConfig, ClassifierError,
    ClassifierMode, HeuristicEngine, HeuristicRule, LogStore, ProviderAnalysis, TAG_AI_FALLBACK,
    TAG_HIGH_CONFIDENCE,
};
use logwarden_core::pipeline::BoxFuture;
use logwarden_core::types::{LogLevel, LogRecord};

// --- 테스트 provider / 저장소 ---

struct CountingProvider {
    calls: AtomicUsize,
    response: Result<ProviderAnalysis, String>,
}

impl CountingProvider {
    fn answering(classification: &str, confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Ok(ProviderAnalysis {
                classification: Some(classification.to_owned()),
                explanation: Some("provider explanation".to_owned()),
                suggestion: Some("provider suggestion".to_owned()),
                confidence,
                tags: vec!["provider".to_owned()],
            }),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Err("upstream 503".to_owned()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AnalysisProvider for CountingProvider {
    fn analyze<'a>(
        &'a self,
        _request: &'a AnalysisRequest<'a>,
    ) -> BoxFuture<'a, Result<ProviderAnalysis, ClassifierError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.response.clone().map_err(ClassifierError::Provider);
        Box::pin(async move { response })
    }

    fn name(&self) -> &str {
        "counting"
    }
}

struct RecordingStore {
    updates: mpsc::UnboundedSender<(String, ClassificationUpdate)>,
    fail: bool,
}

impl LogStore for RecordingStore {
    fn update_classification<'a>(
        &'a self,
        log_id: &'a str,
        update: &'a ClassificationUpdate,
    ) -> BoxFuture<'a, Result<(), ClassifierError>> {
        let _ = self.updates.send((log_id.to_owned(), update.clone()));
        let fail = self.fail;
        Box::pin(async move {
            if fail {
                Err(ClassifierError::Store("document store unavailable".to_owned()))
            } else {
                Ok(())
            }
        })
    }
}

// --- 헬퍼 ---

fn rule(id: &str, pattern: &str, rank: u32, classification: &str) -> HeuristicRule {
    HeuristicRule {
        id: id.to_owned(),
        pattern: pattern.to_owned(),
        level: None,
        classification: classification.to_owned(),
        explanation: format!("{classification} detected"),
        suggestion: format!("handle {classification}"),
        priority_rank: rank,
        tags: vec![id.to_owned()],
    }
}

fn engine() -> HeuristicEngine {
    let mut engine = HeuristicEngine::new();
    engine
        .add_rule(rule("disk", "(?i)no space left", 5, "Disk Full"))
        .unwrap();
    engine
        .add_rule(rule("io", "(?i)write .* failed", 40, "I/O Failure"))
        .unwrap();
    engine
}

fn config(mode: ClassifierMode) -> ClassifierConfig {
    ClassifierConfig {
        mode,
        builtin_rules: false,
        ..ClassifierConfig::default()
    }
}

async fn pipeline_with(
    config: ClassifierConfig,
    provider: Option<Arc<CountingProvider>>,
) -> ClassificationPipeline<MemoryCacheStore> {
    let mut builder = ClassificationPipelineBuilder::new()
        .config(config)
        .cache(Arc::new(MemoryCacheStore::with_limits(None, 1000)))
        .heuristics(engine());
    if let Some(provider) = provider {
        builder = builder.provider(provider);
    }
    builder.build().await.unwrap()
}

fn ctx() -> AnalysisContext {
    AnalysisContext::default()
}

// --- 모드별 동작 ---

#[tokio::test]
async fn heuristic_mode_never_calls_provider() {
    let provider = CountingProvider::answering("Cache Stampede", 0.9);
    let pipeline = pipeline_with(config(ClassifierMode::Heuristic), Some(provider.clone())).await;

    let result = pipeline.analyze("log-1", "user signed in", &ctx()).await;

    assert!(result.is_unclassified());
    assert!((result.confidence.value() - 0.3).abs() < 1e-9);
    assert_eq!(result.source, AnalysisSource::Heuristic);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn hybrid_low_confidence_blends_provider_result() {
    let provider = CountingProvider::answering("Cache Stampede", 0.9);
    let pipeline = pipeline_with(config(ClassifierMode::Hybrid), Some(provider.clone())).await;

    let result = pipeline
        .analyze("log-2", "thundering herd on cache refill", &ctx())
        .await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(result.source, AnalysisSource::Hybrid);
    assert_eq!(result.classification, "Cache Stampede");
    // 0.4 * 0.3 + 0.6 * 0.9
    assert!((result.confidence.value() - 0.66).abs() < 1e-9);
    assert!(result.has_tag("provider"));
    assert!(!result.has_tag(TAG_HIGH_CONFIDENCE));
}

#[tokio::test]
async fn hybrid_confident_heuristic_skips_provider() {
    let provider = CountingProvider::answering("Cache Stampede", 0.9);
    let pipeline = pipeline_with(config(ClassifierMode::Hybrid), Some(provider.clone())).await;

    let result = pipeline
        .analyze("log-3", "No space left on device", &ctx())
        .await;

    assert_eq!(provider.calls(), 0);
    assert_eq!(result.classification, "Disk Full");
    assert_eq!(result.source, AnalysisSource::Heuristic);
    assert!(result.has_tag(TAG_HIGH_CONFIDENCE));
}

#[tokio::test]
async fn two_matching_rules_raise_confidence_and_strongest_wins() {
    let pipeline = pipeline_with(config(ClassifierMode::Heuristic), None).await;

    let result = pipeline
        .analyze("log-4", "write /data/x failed: no space left", &ctx())
        .await;

    assert_eq!(result.classification, "Disk Full");
    assert_eq!(result.suggestion, "handle Disk Full");
    assert!((result.confidence.value() - 0.8).abs() < 1e-9);
    assert!(result.has_tag("disk") && result.has_tag("io"));
}

#[tokio::test]
async fn hybrid_without_provider_uses_heuristic_only() {
    let pipeline = pipeline_with(config(ClassifierMode::Hybrid), None).await;
    assert!(!pipeline.has_provider());

    let result = pipeline.analyze("log-5", "nothing to see", &ctx()).await;
    assert!(result.is_unclassified());
    assert!(!result.has_tag(TAG_AI_FALLBACK));
}

#[tokio::test]
async fn provider_failure_falls_back_to_heuristic() {
    let provider = CountingProvider::failing();
    let pipeline = pipeline_with(config(ClassifierMode::Hybrid), Some(provider.clone())).await;

    let result = pipeline.analyze("log-6", "strange behaviour", &ctx()).await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(result.source, AnalysisSource::Heuristic);
    assert!(result.is_unclassified());
    assert!(result.has_tag(TAG_AI_FALLBACK));
}

#[tokio::test]
async fn ai_mode_calls_provider_even_when_confident() {
    let provider = CountingProvider::answering("Volume Exhausted", 0.85);
    let pipeline = pipeline_with(config(ClassifierMode::Ai), Some(provider.clone())).await;

    let result = pipeline
        .analyze("log-7", "no space left on device", &ctx())
        .await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(result.source, AnalysisSource::Ai);
    assert_eq!(result.classification, "Volume Exhausted");
    assert!((result.confidence.value() - 0.85).abs() < 1e-9);
}

#[tokio::test]
async fn ai_mode_failure_keeps_heuristic_with_fallback_tag() {
    let provider = CountingProvider::failing();
    let pipeline = pipeline_with(config(ClassifierMode::Ai), Some(provider.clone())).await;

    let result = pipeline
        .analyze("log-8", "no space left on device", &ctx())
        .await;

    assert_eq!(result.classification, "Disk Full");
    assert_eq!(result.source, AnalysisSource::Heuristic);
    assert!(result.has_tag(TAG_AI_FALLBACK));
    assert!(!result.has_tag(TAG_HIGH_CONFIDENCE));
}

#[tokio::test]
async fn ai_mode_requires_provider() {
    let result = ClassificationPipelineBuilder::new()
        .config(config(ClassifierMode::Ai))
        .cache(Arc::new(MemoryCacheStore::with_limits(None, 10)))
        .build()
        .await;
    assert!(matches!(result, Err(ClassifierError::Config { .. })));
}

#[tokio::test]
async fn build_requires_cache() {
    let result = ClassificationPipelineBuilder::<MemoryCacheStore>::new()
        .config(config(ClassifierMode::Heuristic))
        .build()
        .await;
    assert!(matches!(result, Err(ClassifierError::Config { .. })));
}

// --- 캐시 ---

#[tokio::test]
async fn repeated_analysis_is_served_from_cache() {
    let provider = CountingProvider::answering("Cache Stampede", 0.9);
    let pipeline = pipeline_with(config(ClassifierMode::Hybrid), Some(provider.clone())).await;

    let first = pipeline.analyze("log-9", "odd latency spike", &ctx()).await;
    let second = pipeline.analyze("log-9", "odd latency spike", &ctx()).await;

    assert_eq!(first, second);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn different_log_ids_do_not_share_cache_entries() {
    let provider = CountingProvider::answering("Cache Stampede", 0.9);
    let pipeline = pipeline_with(config(ClassifierMode::Hybrid), Some(provider.clone())).await;

    pipeline.analyze("log-a", "odd latency spike", &ctx()).await;
    pipeline.analyze("log-b", "odd latency spike", &ctx()).await;

    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cache_entry_expires_after_ttl() {
    let provider = CountingProvider::answering("Cache Stampede", 0.9);
    let config = ClassifierConfig {
        cache_ttl: Duration::from_secs(1),
        ..config(ClassifierMode::Hybrid)
    };
    let pipeline = pipeline_with(config, Some(provider.clone())).await;

    pipeline.analyze("log-10", "odd latency spike", &ctx()).await;
    tokio::time::advance(Duration::from_millis(500)).await;
    pipeline.analyze("log-10", "odd latency spike", &ctx()).await;
    assert_eq!(provider.calls(), 1);

    tokio::time::advance(Duration::from_millis(600)).await;
    pipeline.analyze("log-10", "odd latency spike", &ctx()).await;
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn invalidate_log_forces_recompute() {
    let provider = CountingProvider::answering("Cache Stampede", 0.9);
    let pipeline = pipeline_with(config(ClassifierMode::Hybrid), Some(provider.clone())).await;

    pipeline.analyze("log-11", "odd latency spike", &ctx()).await;
    assert_eq!(pipeline.invalidate_log("log-11").await.unwrap(), 1);
    pipeline.analyze("log-11", "odd latency spike", &ctx()).await;

    assert_eq!(provider.calls(), 2);
}

// --- 결과 저장 ---

#[tokio::test]
async fn computed_result_is_persisted_once() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let store = Arc::new(RecordingStore {
        updates: tx,
        fail: false,
    });
    let pipeline = ClassificationPipelineBuilder::new()
        .config(config(ClassifierMode::Heuristic))
        .cache(Arc::new(MemoryCacheStore::with_limits(None, 100)))
        .heuristics(engine())
        .store(store)
        .build()
        .await
        .unwrap();

    let result = pipeline
        .analyze("log-12", "no space left on device", &ctx())
        .await;

    let (log_id, update) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log_id, "log-12");
    assert_eq!(update.classification, result.classification);
    assert_eq!(update.source, AnalysisSource::Heuristic);

    // 캐시 적중은 다시 저장하지 않음
    pipeline
        .analyze("log-12", "no space left on device", &ctx())
        .await;
    tokio::task::yield_now().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn persistence_failure_does_not_affect_result() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let store = Arc::new(RecordingStore {
        updates: tx,
        fail: true,
    });
    let pipeline = ClassificationPipelineBuilder::new()
        .config(config(ClassifierMode::Heuristic))
        .cache(Arc::new(MemoryCacheStore::with_limits(None, 100)))
        .heuristics(engine())
        .store(store)
        .build()
        .await
        .unwrap();

    let result = pipeline
        .analyze("log-13", "no space left on device", &ctx())
        .await;
    assert_eq!(result.classification, "Disk Full");

    let (log_id, _) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log_id, "log-13");
}

// --- 규칙 / 레코드 ---

#[tokio::test]
async fn rules_are_loaded_from_configured_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("queue_full.yml"),
        "id: queue_full\n\
         pattern: '(?i)queue is full'\n\
         classification: Queue Saturation\n\
         suggestion: Scale consumers.\n\
         priority_rank: 3\n",
    )
    .unwrap();

    let config = ClassifierConfig {
        rule_dir: Some(dir.path().to_path_buf()),
        ..config(ClassifierMode::Heuristic)
    };
    let pipeline = ClassificationPipelineBuilder::new()
        .config(config)
        .cache(Arc::new(MemoryCacheStore::with_limits(None, 100)))
        .build()
        .await
        .unwrap();

    assert_eq!(pipeline.heuristics().rule_count(), 1);
    let result = pipeline
        .analyze("log-14", "ingest queue is full, dropping", &ctx())
        .await;
    assert_eq!(result.classification, "Queue Saturation");
}

#[tokio::test]
async fn builtin_rules_are_used_by_default() {
    let pipeline = ClassificationPipelineBuilder::new()
        .config(ClassifierConfig {
            mode: ClassifierMode::Heuristic,
            ..ClassifierConfig::default()
        })
        .cache(Arc::new(MemoryCacheStore::with_limits(None, 100)))
        .build()
        .await
        .unwrap();

    assert!(pipeline.heuristics().rule_count() > 0);
    let result = pipeline
        .analyze("log-15", "java.lang.OutOfMemoryError: Java heap space", &ctx())
        .await;
    assert_eq!(result.classification, "Memory Exhaustion");
}

#[tokio::test]
async fn analyze_record_applies_level_filter() {
    let mut engine = HeuristicEngine::new();
    let mut errors_only = rule("failed", "(?i)job failed", 1, "Job Failure");
    errors_only.level = Some(LogLevel::Error);
    engine.add_rule(errors_only).unwrap();

    let pipeline = ClassificationPipelineBuilder::new()
        .config(config(ClassifierMode::Heuristic))
        .cache(Arc::new(MemoryCacheStore::with_limits(None, 100)))
        .heuristics(engine)
        .build()
        .await
        .unwrap();

    let info = LogRecord::new("log-16", "Job failed after retry").with_level(LogLevel::Info);
    assert!(pipeline.analyze_record(&info).await.is_unclassified());

    let error = LogRecord::new("log-17", "Job failed after retry").with_level(LogLevel::Error);
    assert_eq!(
        pipeline.analyze_record(&error).await.classification,
        "Job Failure"
    );
}
