//! Module registry lifecycle tests.
//!
//! Uses a mock `DynPipeline` to check start/stop ordering, failure
//! handling, and health aggregation.

use std::sync::{Arc, Mutex};

use logwarden_core::error::{LogwardenError, PipelineError};
use logwarden_core::pipeline::{BoxFuture, DynPipeline, HealthStatus};
use logwarden_daemon::health::{ModuleHealth, aggregate_status};
use logwarden_daemon::modules::{ModuleHandle, ModuleRegistry};

type EventLog = Arc<Mutex<Vec<String>>>;

struct MockPipeline {
    name: String,
    running: bool,
    fail_start: bool,
    health: HealthStatus,
    events: EventLog,
}

impl MockPipeline {
    fn new(name: &str, events: &EventLog) -> Self {
        Self {
            name: name.to_owned(),
            running: false,
            fail_start: false,
            health: HealthStatus::Healthy,
            events: Arc::clone(events),
        }
    }

    fn failing(mut self) -> Self {
        self.fail_start = true;
        self
    }

    fn with_health(mut self, health: HealthStatus) -> Self {
        self.health = health;
        self
    }

    fn record(&self, event: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{}:{event}", self.name));
    }
}

impl DynPipeline for MockPipeline {
    fn start(&mut self) -> BoxFuture<'_, Result<(), LogwardenError>> {
        Box::pin(async move {
            if self.fail_start {
                return Err(PipelineError::InitFailed("boom".to_owned()).into());
            }
            self.running = true;
            self.record("start");
            Ok(())
        })
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), LogwardenError>> {
        Box::pin(async move {
            if !self.running {
                return Err(PipelineError::NotRunning.into());
            }
            self.running = false;
            self.record("stop");
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(async move { self.health.clone() })
    }
}

fn handle(pipeline: MockPipeline, enabled: bool) -> ModuleHandle {
    let name = pipeline.name.clone();
    ModuleHandle::new(name, enabled, Box::new(pipeline))
}

fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn starts_in_order_and_stops_in_reverse() {
    let log = EventLog::default();
    let mut registry = ModuleRegistry::new();
    registry.register(handle(MockPipeline::new("scheduler", &log), true));
    registry.register(handle(MockPipeline::new("alerting", &log), true));

    registry.start_all().await.unwrap();
    registry.stop_all().await.unwrap();

    assert_eq!(
        events(&log),
        vec![
            "scheduler:start",
            "alerting:start",
            "alerting:stop",
            "scheduler:stop"
        ]
    );
}

#[tokio::test]
async fn disabled_modules_are_skipped() {
    let log = EventLog::default();
    let mut registry = ModuleRegistry::new();
    registry.register(handle(MockPipeline::new("scheduler", &log), true));
    registry.register(handle(MockPipeline::new("alerting", &log), false));

    assert_eq!(registry.count(), 2);
    assert_eq!(registry.enabled_count(), 1);

    registry.start_all().await.unwrap();
    registry.stop_all().await.unwrap();
    assert_eq!(events(&log), vec!["scheduler:start", "scheduler:stop"]);
}

#[tokio::test]
async fn start_failure_stops_remaining_starts() {
    let log = EventLog::default();
    let mut registry = ModuleRegistry::new();
    registry.register(handle(MockPipeline::new("scheduler", &log), true));
    registry.register(handle(MockPipeline::new("alerting", &log).failing(), true));
    registry.register(handle(MockPipeline::new("extra", &log), true));

    let err = registry.start_all().await.unwrap_err();
    assert!(err.to_string().contains("alerting"));
    assert_eq!(events(&log), vec!["scheduler:start"]);

    // 실행 중이 아닌 모듈은 정지 시 건너뜀
    registry.stop_all().await.unwrap();
    assert_eq!(events(&log), vec!["scheduler:start", "scheduler:stop"]);
}

#[tokio::test]
async fn health_reports_every_module() {
    let log = EventLog::default();
    let mut registry = ModuleRegistry::new();
    registry.register(handle(MockPipeline::new("scheduler", &log), true));
    registry.register(handle(
        MockPipeline::new("alerting", &log)
            .with_health(HealthStatus::Degraded("evaluation slow".to_owned())),
        true,
    ));
    registry.register(handle(
        MockPipeline::new("spare", &log).with_health(HealthStatus::Unhealthy("off".to_owned())),
        false,
    ));

    let modules: Vec<ModuleHealth> = registry
        .health_statuses()
        .await
        .into_iter()
        .map(|(name, enabled, status)| ModuleHealth {
            name,
            enabled,
            status,
        })
        .collect();
    assert_eq!(modules.len(), 3);
    // 비활성 모듈은 Healthy로 보고됨
    assert_eq!(modules[2].status, HealthStatus::Healthy);
    assert_eq!(
        aggregate_status(&modules),
        HealthStatus::Degraded("alerting: evaluation slow".to_owned())
    );
}
