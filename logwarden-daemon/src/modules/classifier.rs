//! Classification pipeline initialization.
//!
//! Builds the configured cache backend and the classification pipeline
//! that scheduled tasks run through.

use std::sync::Arc;

use anyhow::Result;

use logwarden_cache::{CacheBackend, CacheConfig};
use logwarden_classifier::{ClassificationPipeline, ClassificationPipelineBuilder, ClassifierConfig};
use logwarden_core::config::LogwardenConfig;

/// Cache backend and the pipeline sharing it.
pub struct ClassifierParts {
    /// Shared cache, kept for health reporting.
    pub cache: Arc<CacheBackend>,
    /// Classification pipeline.
    pub pipeline: Arc<ClassificationPipeline<CacheBackend>>,
}

/// Build the cache backend and classification pipeline.
pub async fn init(config: &LogwardenConfig) -> Result<ClassifierParts> {
    let cache_config = CacheConfig::from_core(&config.cache)
        .map_err(|e| anyhow::anyhow!("invalid cache config: {e}"))?;
    let cache = Arc::new(
        CacheBackend::from_config(&cache_config)
            .map_err(|e| anyhow::anyhow!("failed to create cache backend: {e}"))?,
    );

    let classifier_config = ClassifierConfig::from_core(&config.classifier)
        .map_err(|e| anyhow::anyhow!("invalid classifier config: {e}"))?;
    let pipeline = ClassificationPipelineBuilder::new()
        .config(classifier_config)
        .cache(Arc::clone(&cache))
        .build()
        .await
        .map_err(|e| anyhow::anyhow!("failed to build classification pipeline: {e}"))?;

    tracing::info!(
        mode = ?pipeline.mode(),
        rules = pipeline.heuristics().rule_count(),
        provider = pipeline.has_provider(),
        cache = cache.name(),
        "classification pipeline initialized"
    );

    Ok(ClassifierParts {
        cache,
        pipeline: Arc::new(pipeline),
    })
}
