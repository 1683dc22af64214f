//! Module orchestration -- assembly, channel wiring, and lifecycle management.
//!
//! The [`Orchestrator`] builds every component from one `LogwardenConfig`,
//! wires their channels, starts them in dependency order, and shuts them
//! down on SIGTERM/SIGINT.
//!
//! # Wiring
//!
//! ```text
//! input lines --ingest--> TaskScheduler --> ClassificationTaskHandler
//!                              |                 |  ClassificationPipeline (cache, provider, store)
//!                              |                 v
//!                              |            MetricRegistry <--poll-- AlertEngine
//!                              v                                         |
//!                        result logger                       notification logger
//! ```
//!
//! # Startup Order
//!
//! 1. Scheduler (executors ready before ingestion begins)
//! 2. Alert engine
//!
//! Modules stop in reverse order after ingestion has stopped.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use logwarden_alerting::{AlertNotification, MetricRegistry};
use logwarden_cache::{CacheBackend, CacheStore};
use logwarden_core::config::LogwardenConfig;
use logwarden_scheduler::{SchedulerStats, TaskSubmitter, WorkerResult};

use crate::handler::ClassificationTaskHandler;
use crate::health::{DaemonHealth, ModuleHealth, aggregate_status};
use crate::ingest::{self, IngestReport};
use crate::metrics_server;
use crate::modules::{self, ModuleRegistry};

/// How often scheduler statistics are copied into the metric registry.
const STATS_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Metric registry gauges mirrored from scheduler statistics.
pub const SCHEDULER_QUEUE_LENGTH: &str = "scheduler_queue_length";
/// Busy executors.
pub const SCHEDULER_ACTIVE_EXECUTORS: &str = "scheduler_active_executors";
/// Tasks whose handler failed.
pub const SCHEDULER_TASKS_FAILED: &str = "scheduler_tasks_failed";
/// Tasks lost to executor crashes.
pub const SCHEDULER_TASKS_LOST: &str = "scheduler_tasks_lost";

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: LogwardenConfig,
    modules: ModuleRegistry,
    cache: Arc<CacheBackend>,
    submitter: TaskSubmitter,
    metrics: MetricRegistry,
    shutdown_tx: broadcast::Sender<()>,
    start_time: Instant,
    stats_rx: watch::Receiver<SchedulerStats>,
    result_rx: Option<mpsc::Receiver<WorkerResult>>,
    notification_rx: Option<mpsc::Receiver<AlertNotification>>,
    background: Vec<JoinHandle<()>>,
    ingest_task: Option<JoinHandle<IngestReport>>,
    started: bool,
}

impl Orchestrator {
    /// Load configuration from `config_path` and build the orchestrator.
    ///
    /// A missing file falls back to defaults plus environment overrides.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = load_config(config_path).await?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Installs the metrics recorder when `[metrics] enabled`.
    pub async fn build_from_config(config: LogwardenConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {e}"))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }
        Self::assemble(config).await
    }

    /// Build without touching the global metrics recorder.
    pub async fn build_without_metrics(config: LogwardenConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {e}"))?;
        Self::assemble(config).await
    }

    async fn assemble(config: LogwardenConfig) -> Result<Self> {
        let metrics = MetricRegistry::new();
        let classifier = modules::classifier::init(&config).await?;
        let handler = ClassificationTaskHandler::new(classifier.pipeline, metrics.clone());

        let mut registry = ModuleRegistry::new();
        let scheduler = modules::scheduler::init(&config, handler)?;
        registry.register(scheduler.handle);

        let mut notification_rx = None;
        if let Some(alerting) = modules::alerting::init(&config, &metrics)? {
            registry.register(alerting.handle);
            notification_rx = Some(alerting.notification_rx);
        }

        let (shutdown_tx, _) = broadcast::channel(16);
        tracing::info!(
            modules = registry.count(),
            enabled = registry.enabled_count(),
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            modules: registry,
            cache: classifier.cache,
            submitter: scheduler.submitter,
            metrics,
            shutdown_tx,
            start_time: Instant::now(),
            stats_rx: scheduler.stats_rx,
            result_rx: Some(scheduler.result_rx),
            notification_rx,
            background: Vec::new(),
            ingest_task: None,
            started: false,
        })
    }

    /// Start every module, then the background consumers.
    ///
    /// On a startup failure the modules that did start are stopped again.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(anyhow::anyhow!("orchestrator already started"));
        }

        if let Err(e) = self.modules.start_all().await {
            tracing::warn!(error = %e, "startup failed, stopping already-started modules");
            if let Err(stop_err) = self.modules.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback failed during startup failure cleanup"
                );
            }
            return Err(e);
        }

        if let Some(rx) = self.result_rx.take() {
            self.background
                .push(spawn_result_logger(rx, self.shutdown_tx.subscribe()));
        }
        if let Some(rx) = self.notification_rx.take() {
            self.background
                .push(spawn_notification_logger(rx, self.shutdown_tx.subscribe()));
        }
        self.background.push(spawn_stats_sampler(
            self.stats_rx.clone(),
            self.metrics.clone(),
            self.shutdown_tx.subscribe(),
        ));

        self.started = true;
        self.start_time = Instant::now();
        let health = self.health().await;
        tracing::info!(status = ?health.status, "logwarden started");
        Ok(())
    }

    /// Begin ingesting log lines from `reader`.
    pub fn ingest<R>(&mut self, reader: R)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        self.ingest_task = Some(ingest::spawn_ingest(
            reader,
            self.submitter.clone(),
            self.shutdown_tx.subscribe(),
        ));
    }

    /// Wait for the current ingestion to reach end of input.
    pub async fn wait_for_ingest(&mut self) -> Option<IngestReport> {
        let task = self.ingest_task.take()?;
        match task.await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "ingest task ended abnormally");
                None
            }
        }
    }

    /// Start, ingest `input` (a path or `-` for stdin), and run until a
    /// shutdown signal arrives.
    pub async fn run(&mut self, input: Option<&Path>) -> Result<()> {
        self.start().await?;

        match input {
            Some(path) if path == Path::new("-") => {
                tracing::info!("ingesting logs from stdin");
                self.ingest(BufReader::new(tokio::io::stdin()));
            }
            Some(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    anyhow::anyhow!("failed to open log input {}: {e}", path.display())
                })?;
                tracing::info!(path = %path.display(), "ingesting logs from file");
                self.ingest(BufReader::new(file));
            }
            None => tracing::info!("no log input configured, evaluating alert rules only"),
        }

        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal, "shutdown signal received");
        self.shutdown().await
    }

    /// Stop ingestion and background tasks, then every module.
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;

        tracing::info!("broadcasting shutdown signal to all tasks");
        let _ = self.shutdown_tx.send(());

        if let Some(report) = self.wait_for_ingest().await {
            tracing::info!(submitted = report.submitted, skipped = report.skipped, "ingestion stopped");
        }
        for task in self.background.drain(..) {
            let _ = task.await;
        }

        tracing::info!("stopping all modules");
        self.modules.stop_all().await
    }

    /// Current aggregated health, including the cache backend.
    pub async fn health(&self) -> DaemonHealth {
        let mut modules: Vec<ModuleHealth> = self
            .modules
            .health_statuses()
            .await
            .into_iter()
            .map(|(name, enabled, status)| ModuleHealth {
                name,
                enabled,
                status,
            })
            .collect();
        modules.push(ModuleHealth {
            name: format!("cache ({})", self.cache.name()),
            enabled: true,
            status: self.cache.health_check().await,
        });

        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs: self.start_time.elapsed().as_secs(),
            modules,
        }
    }

    /// Cloneable submission handle for additional producers.
    pub fn submitter(&self) -> TaskSubmitter {
        self.submitter.clone()
    }

    /// Metric registry shared by the classification handler and the alert engine.
    pub fn metric_registry(&self) -> MetricRegistry {
        self.metrics.clone()
    }

    /// Loaded configuration.
    pub fn config(&self) -> &LogwardenConfig {
        &self.config
    }
}

/// Load `logwarden.toml`, falling back to defaults when the file is absent.
///
/// Environment overrides apply in both cases.
pub async fn load_config(path: &Path) -> Result<LogwardenConfig> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        return LogwardenConfig::load(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config {}: {e}", path.display()));
    }

    tracing::warn!(path = %path.display(), "config file not found, using defaults");
    let mut config = LogwardenConfig::default();
    config.apply_env_overrides();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {e}"))?;
    Ok(config)
}

/// Wait for SIGTERM or SIGINT and return the signal name.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {e}"))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {e}"))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Log task results until shutdown.
fn spawn_result_logger(
    mut result_rx: mpsc::Receiver<WorkerResult>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                result = result_rx.recv() => {
                    let Some(result) = result else {
                        tracing::debug!("result channel closed, exiting logger");
                        break;
                    };
                    if result.success {
                        let classification = result
                            .data
                            .as_ref()
                            .and_then(|d| d.get("classification"))
                            .and_then(|c| c.as_str())
                            .unwrap_or_default()
                            .to_owned();
                        tracing::info!(
                            task_id = %result.task_id,
                            classification = %classification,
                            processing_time_ms = result.processing_time_ms,
                            "task completed"
                        );
                    } else {
                        tracing::warn!(
                            task_id = %result.task_id,
                            error = result.error.as_deref().unwrap_or("unknown"),
                            "task failed"
                        );
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("result logger shutting down");
                    break;
                }
            }
        }
    })
}

/// Log alert notifications until shutdown.
fn spawn_notification_logger(
    mut notification_rx: mpsc::Receiver<AlertNotification>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                notification = notification_rx.recv() => {
                    let Some(notification) = notification else {
                        tracing::debug!("notification channel closed, exiting logger");
                        break;
                    };
                    let alert = notification.alert();
                    tracing::info!(
                        event = notification.kind(),
                        alert_id = %alert.id,
                        rule_id = %alert.rule_id,
                        severity = alert.severity.as_str(),
                        summary = %alert.summary(),
                        "alert notification"
                    );
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("notification logger shutting down");
                    break;
                }
            }
        }
    })
}

/// Mirror scheduler statistics into the metric registry so alert rules can
/// watch queue depth and failures.
fn spawn_stats_sampler(
    stats_rx: watch::Receiver<SchedulerStats>,
    metrics: MetricRegistry,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_SAMPLE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let stats = stats_rx.borrow().clone();
                    record_scheduler_stats(&metrics, &stats).await;
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("stats sampler shutting down");
                    break;
                }
            }
        }
    })
}

async fn record_scheduler_stats(metrics: &MetricRegistry, stats: &SchedulerStats) {
    metrics
        .set_gauge(SCHEDULER_QUEUE_LENGTH, stats.queue_length as f64)
        .await;
    metrics
        .set_gauge(SCHEDULER_ACTIVE_EXECUTORS, stats.active_executors as f64)
        .await;
    metrics
        .set_gauge(SCHEDULER_TASKS_FAILED, stats.tasks_failed as f64)
        .await;
    metrics
        .set_gauge(SCHEDULER_TASKS_LOST, stats.tasks_lost as f64)
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stats_are_mirrored_as_gauges() {
        let metrics = MetricRegistry::new();
        let stats = SchedulerStats {
            queue_length: 7,
            active_executors: 2,
            tasks_failed: 3,
            tasks_lost: 1,
            ..SchedulerStats::default()
        };
        record_scheduler_stats(&metrics, &stats).await;
        assert_eq!(metrics.gauge(SCHEDULER_QUEUE_LENGTH).await, Some(7.0));
        assert_eq!(metrics.gauge(SCHEDULER_ACTIVE_EXECUTORS).await, Some(2.0));
        assert_eq!(metrics.gauge(SCHEDULER_TASKS_FAILED).await, Some(3.0));
        assert_eq!(metrics.gauge(SCHEDULER_TASKS_LOST).await, Some(1.0));
    }

    #[tokio::test]
    async fn loggers_exit_on_shutdown() {
        let (_result_tx, result_rx) = mpsc::channel::<WorkerResult>(4);
        let (_notification_tx, notification_rx) = mpsc::channel::<AlertNotification>(4);
        let (shutdown_tx, _) = broadcast::channel(1);

        let results = spawn_result_logger(result_rx, shutdown_tx.subscribe());
        let notifications = spawn_notification_logger(notification_rx, shutdown_tx.subscribe());
        let _ = shutdown_tx.send(());

        let joined = tokio::time::timeout(Duration::from_secs(1), async {
            let _ = results.await;
            let _ = notifications.await;
        })
        .await;
        assert!(joined.is_ok(), "loggers should stop on shutdown");
    }

    #[tokio::test]
    async fn missing_config_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/logwarden/logwarden.toml"))
            .await
            .unwrap();
        assert_eq!(config.scheduler.pool_size, LogwardenConfig::default().scheduler.pool_size);
    }
}
