//! Orchestrator integration tests.
//!
//! Full flow: config -> module init -> start -> ingest -> classify ->
//! metrics -> shutdown.

use std::io::Cursor;
use std::time::Duration;

use logwarden_core::config::LogwardenConfig;
use logwarden_core::pipeline::HealthStatus;
use logwarden_daemon::handler::{LOGS_CLASSIFIED, LOGS_UNCLASSIFIED, classification_metric};
use logwarden_daemon::orchestrator::Orchestrator;

fn test_config() -> LogwardenConfig {
    LogwardenConfig::parse(
        r#"
[general]
log_level = "info"

[scheduler]
pool_size = 2
shutdown_timeout_secs = 1

[classifier]
mode = "heuristic"

[alerting]
enabled = true
tick_interval_secs = 1
"#,
    )
    .expect("failed to parse test config")
}

#[tokio::test]
async fn build_start_and_shutdown() {
    let mut orchestrator = Orchestrator::build_without_metrics(test_config())
        .await
        .unwrap();

    orchestrator.start().await.unwrap();
    // 실행기 통계는 비동기로 발행되므로 Healthy가 될 때까지 대기
    let healthy = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if orchestrator.health().await.status == HealthStatus::Healthy {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(healthy.is_ok(), "orchestrator should become healthy");

    let health = orchestrator.health().await;
    // scheduler, alerting, cache
    assert_eq!(health.modules.len(), 3);

    assert!(orchestrator.start().await.is_err());

    orchestrator.shutdown().await.unwrap();
    let health = orchestrator.health().await;
    assert!(health.status.is_unhealthy());
}

#[tokio::test]
async fn alerting_can_be_disabled() {
    let mut config = test_config();
    config.alerting.enabled = false;
    let mut orchestrator = Orchestrator::build_without_metrics(config).await.unwrap();

    orchestrator.start().await.unwrap();
    let health = orchestrator.health().await;
    // scheduler, cache
    assert_eq!(health.modules.len(), 2);
    assert!(health.modules.iter().all(|m| m.name != "alerting"));
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn builds_from_config_file_with_rule_directory() {
    let dir = tempfile::tempdir().unwrap();
    let rule_dir = dir.path().join("alert-rules");
    tokio::fs::create_dir(&rule_dir).await.unwrap();
    tokio::fs::write(
        rule_dir.join("errors.yml"),
        r#"
id: errors
name: Classification errors
severity: high
condition:
  metric: classification_errors
  operator: gt
  threshold: 0
  aggregation: max
  window_secs: 60
sustained_duration_secs: 0
cooldown_secs: 60
actions:
  - type: console
"#,
    )
    .await
    .unwrap();
    tokio::fs::write(rule_dir.join("broken.yml"), "id: [").await.unwrap();

    let config_path = dir.path().join("logwarden.toml");
    let config = format!(
        r#"
[scheduler]
pool_size = 1

[classifier]
mode = "heuristic"

[alerting]
rule_dir = '{}'

[metrics]
enabled = false
"#,
        rule_dir.display()
    );
    tokio::fs::write(&config_path, config).await.unwrap();

    let mut orchestrator = Orchestrator::build(&config_path).await.unwrap();
    assert_eq!(orchestrator.config().scheduler.pool_size, 1);

    orchestrator.start().await.unwrap();
    let health = orchestrator.health().await;
    assert!(!health.status.is_unhealthy());
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let mut config = test_config();
    config.classifier.mode = "telepathy".to_owned();
    assert!(Orchestrator::build_without_metrics(config).await.is_err());
}

#[tokio::test]
async fn ingested_logs_are_classified() {
    let mut orchestrator = Orchestrator::build_without_metrics(test_config())
        .await
        .unwrap();
    orchestrator.start().await.unwrap();

    let input = [
        r#"{"id":"a1","message":"connection refused while connecting to postgres","level":"error"}"#,
        "worker heartbeat ok",
        "",
        r#"{"id":"a2","message":"request to payments timed out after 30s","level":"warn"}"#,
        r#"{"id":"broken""#,
    ]
    .join("\n");
    orchestrator.ingest(Cursor::new(input.into_bytes()));

    let report = orchestrator.wait_for_ingest().await.unwrap();
    assert_eq!(report.submitted, 3);
    assert_eq!(report.skipped, 1);

    let metrics = orchestrator.metric_registry();
    let done = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let total =
                metrics.total(LOGS_CLASSIFIED).await + metrics.total(LOGS_UNCLASSIFIED).await;
            if total >= 3.0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(done.is_ok(), "all ingested logs should be classified");

    assert_eq!(metrics.total(LOGS_CLASSIFIED).await, 2.0);
    assert_eq!(metrics.total(LOGS_UNCLASSIFIED).await, 1.0);
    assert_eq!(
        metrics
            .total(&classification_metric("Database Connection Error"))
            .await,
        1.0
    );
    assert_eq!(metrics.total(&classification_metric("Timeout")).await, 1.0);

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_utf8_line_is_skipped_without_stopping_ingest() {
    let mut orchestrator = Orchestrator::build_without_metrics(test_config())
        .await
        .unwrap();
    orchestrator.start().await.unwrap();

    let input = b"disk full on /var\n\xff\xfe bad bytes\nconnection refused\ntimeout\n";
    orchestrator.ingest(Cursor::new(input.to_vec()));

    let report = orchestrator.wait_for_ingest().await.unwrap();
    assert_eq!(report.submitted, 3);
    assert_eq!(report.skipped, 1);

    orchestrator.shutdown().await.unwrap();
}
