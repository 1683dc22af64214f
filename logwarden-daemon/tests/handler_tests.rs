//! Classification handler tests.
//!
//! Verifies that scheduled tasks are classified and that outcomes land in
//! the metric registry the alert engine polls.

use std::sync::Arc;
use std::time::Duration;

use logwarden_alerting::{
    Aggregation, AlertCondition, AlertEngineBuilder, AlertNotification, AlertRule, MetricRegistry,
    Operator,
};
use logwarden_cache::MemoryCacheStore;
use logwarden_classifier::{ClassificationPipelineBuilder, ClassifierConfig, ClassifierMode};
use logwarden_core::types::{LogLevel, LogRecord, Severity};
use logwarden_daemon::handler::{
    CLASSIFICATION_ERRORS, ClassificationTaskHandler, LOGS_CLASSIFIED, LOGS_UNCLASSIFIED,
    classification_metric,
};
use logwarden_daemon::ingest::to_request;
use logwarden_scheduler::{Task, TaskHandler, TaskPriority, TaskRequest};

async fn handler(metrics: &MetricRegistry) -> ClassificationTaskHandler<MemoryCacheStore> {
    let config = ClassifierConfig {
        mode: ClassifierMode::Heuristic,
        ..ClassifierConfig::default()
    };
    let pipeline = ClassificationPipelineBuilder::new()
        .config(config)
        .cache(Arc::new(MemoryCacheStore::with_limits(None, 1_000)))
        .build()
        .await
        .unwrap();
    ClassificationTaskHandler::new(Arc::new(pipeline), metrics.clone())
}

fn task(record: &LogRecord) -> Task {
    Task::from_request(to_request(record).unwrap())
}

#[tokio::test]
async fn classified_log_records_metrics() {
    let metrics = MetricRegistry::new();
    let handler = handler(&metrics).await;

    let record = LogRecord::new(
        "log-1",
        "connection refused while connecting to postgres at 10.0.0.3:5432",
    )
    .with_level(LogLevel::Error);
    let value = handler.handle(&task(&record)).await.unwrap();

    assert_eq!(value["classification"], "Database Connection Error");
    assert_eq!(metrics.total(LOGS_CLASSIFIED).await, 1.0);
    assert_eq!(
        metrics
            .total(&classification_metric("Database Connection Error"))
            .await,
        1.0
    );
    assert_eq!(metrics.total(LOGS_UNCLASSIFIED).await, 0.0);
}

#[tokio::test]
async fn unmatched_log_counts_as_unclassified() {
    let metrics = MetricRegistry::new();
    let handler = handler(&metrics).await;

    let record = LogRecord::new("log-2", "user 42 updated their avatar");
    let value = handler.handle(&task(&record)).await.unwrap();

    assert_eq!(value["classification"], "Unclassified");
    assert_eq!(metrics.total(LOGS_UNCLASSIFIED).await, 1.0);
    assert_eq!(metrics.total(LOGS_CLASSIFIED).await, 0.0);
}

#[tokio::test]
async fn unknown_task_type_is_rejected() {
    let metrics = MetricRegistry::new();
    let handler = handler(&metrics).await;

    let request = TaskRequest::new("reindex", TaskPriority::Low, serde_json::json!({}));
    let result = handler.handle(&Task::from_request(request)).await;

    assert!(result.is_err());
    assert_eq!(metrics.total(CLASSIFICATION_ERRORS).await, 1.0);
}

#[tokio::test]
async fn invalid_payload_is_rejected() {
    let metrics = MetricRegistry::new();
    let handler = handler(&metrics).await;

    let request = TaskRequest::new(
        "classify",
        TaskPriority::High,
        serde_json::json!({"id": "log-3"}),
    );
    let result = handler.handle(&Task::from_request(request)).await;

    assert!(result.unwrap_err().to_string().contains("invalid log payload"));
    assert_eq!(metrics.total(CLASSIFICATION_ERRORS).await, 1.0);
}

#[tokio::test]
async fn classification_metrics_drive_alerts() {
    let metrics = MetricRegistry::new();
    let handler = handler(&metrics).await;

    let rule = AlertRule {
        id: "db_down".to_owned(),
        name: "Database connectivity failures".to_owned(),
        severity: Severity::Critical,
        condition: AlertCondition {
            metric: classification_metric("Database Connection Error"),
            operator: Operator::Gte,
            threshold: 2.0,
            aggregation: Aggregation::Max,
            window_secs: 60,
        },
        sustained_duration_secs: 0,
        cooldown_secs: 300,
        actions: vec![],
        enabled: true,
    };
    let (engine, rx) = AlertEngineBuilder::new()
        .source(Arc::new(metrics.clone()))
        .rule(rule)
        .build()
        .unwrap();
    let mut rx = rx.unwrap();

    let record = LogRecord::new("log-4", "postgres connection lost, database unavailable");
    handler.handle(&task(&record)).await.unwrap();
    assert_eq!(engine.evaluate_once().await.fired, 0);

    let record = LogRecord::new("log-5", "could not connect to mysql at db-01");
    handler.handle(&task(&record)).await.unwrap();
    assert_eq!(engine.evaluate_once().await.fired, 1);

    let notification = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(notification, AlertNotification::Fired(_)));
    assert_eq!(notification.alert().rule_id, "db_down");
}
