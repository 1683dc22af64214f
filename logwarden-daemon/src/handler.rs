//! Classification task handler.
//!
//! Runs scheduled `classify` tasks through the classification pipeline and
//! records the outcome into the [`MetricRegistry`] polled by the alert engine.
//!
//! # Recorded metrics
//!
//! | name | recorded when |
//! |------|---------------|
//! | `logs_classified` | a rule or provider produced a classification |
//! | `logs_unclassified` | nothing matched |
//! | `classification_errors` | the task payload was invalid |
//! | `classification:<name>` | per classification name |

use std::sync::Arc;

use logwarden_alerting::MetricRegistry;
use logwarden_cache::CacheStore;
use logwarden_classifier::{ClassificationPipeline, UNCLASSIFIED};
use logwarden_core::types::LogRecord;
use logwarden_scheduler::{HandlerError, Task, TaskHandler};

use crate::ingest::CLASSIFY_TASK;

/// Metric: logs with a classification.
pub const LOGS_CLASSIFIED: &str = "logs_classified";
/// Metric: logs no rule matched.
pub const LOGS_UNCLASSIFIED: &str = "logs_unclassified";
/// Metric: tasks that could not be classified.
pub const CLASSIFICATION_ERRORS: &str = "classification_errors";

/// Per-classification metric name.
pub fn classification_metric(classification: &str) -> String {
    format!("classification:{classification}")
}

/// Scheduler handler wrapping a shared classification pipeline.
pub struct ClassificationTaskHandler<C: CacheStore> {
    pipeline: Arc<ClassificationPipeline<C>>,
    metrics: MetricRegistry,
}

impl<C: CacheStore> ClassificationTaskHandler<C> {
    /// Create a handler recording into `metrics`.
    pub fn new(pipeline: Arc<ClassificationPipeline<C>>, metrics: MetricRegistry) -> Self {
        Self { pipeline, metrics }
    }

    async fn fail(&self, task: &Task, reason: String) -> HandlerError {
        self.metrics.increment(CLASSIFICATION_ERRORS).await;
        tracing::warn!(task_id = %task.id, reason = %reason, "classification task rejected");
        reason.into()
    }
}

impl<C: CacheStore> TaskHandler for ClassificationTaskHandler<C> {
    async fn handle(&self, task: &Task) -> Result<serde_json::Value, HandlerError> {
        if task.task_type != CLASSIFY_TASK {
            return Err(self
                .fail(task, format!("unsupported task type '{}'", task.task_type))
                .await);
        }
        let record: LogRecord = match serde_json::from_value(task.payload.clone()) {
            Ok(record) => record,
            Err(e) => return Err(self.fail(task, format!("invalid log payload: {e}")).await),
        };

        let result = self.pipeline.analyze_record(&record).await;

        if result.classification == UNCLASSIFIED {
            self.metrics.increment(LOGS_UNCLASSIFIED).await;
        } else {
            self.metrics.increment(LOGS_CLASSIFIED).await;
            self.metrics
                .increment(&classification_metric(&result.classification))
                .await;
        }

        tracing::debug!(
            task_id = %task.id,
            log_id = %record.id,
            classification = %result.classification,
            confidence = result.confidence.value(),
            source = result.source.as_str(),
            "log classified"
        );

        Ok(serde_json::to_value(&result)?)
    }
}
