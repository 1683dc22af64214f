//! Task scheduler initialization.
//!
//! ```text
//! ingest --TaskRequest--> TaskScheduler --Task--> ClassificationTaskHandler
//! TaskScheduler --WorkerResult--> result_rx --> orchestrator result logger
//! ```

use anyhow::Result;
use tokio::sync::{mpsc, watch};

use logwarden_cache::CacheStore;
use logwarden_core::config::LogwardenConfig;
use logwarden_scheduler::{
    SchedulerConfig, SchedulerStats, TaskSchedulerBuilder, TaskSubmitter, WorkerResult,
};

use super::ModuleHandle;
use crate::handler::ClassificationTaskHandler;

/// Scheduler handle plus the channels the orchestrator consumes.
pub struct SchedulerParts {
    /// Lifecycle handle.
    pub handle: ModuleHandle,
    /// Cloneable submission handle.
    pub submitter: TaskSubmitter,
    /// Statistics updates.
    pub stats_rx: watch::Receiver<SchedulerStats>,
    /// Task results.
    pub result_rx: mpsc::Receiver<WorkerResult>,
}

/// Build the scheduler around a classification handler.
pub fn init<C: CacheStore>(
    config: &LogwardenConfig,
    handler: ClassificationTaskHandler<C>,
) -> Result<SchedulerParts> {
    let scheduler_config = SchedulerConfig::from_core(&config.scheduler);
    let pool_size = scheduler_config.pool_size;

    let (scheduler, result_rx) = TaskSchedulerBuilder::new()
        .config(scheduler_config)
        .handler(handler)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build task scheduler: {e}"))?;
    let result_rx =
        result_rx.ok_or_else(|| anyhow::anyhow!("task scheduler did not return a result channel"))?;

    let submitter = scheduler.submitter();
    let stats_rx = scheduler.watch_stats();
    tracing::info!(pool_size, "task scheduler initialized");

    Ok(SchedulerParts {
        handle: ModuleHandle::new("scheduler", true, Box::new(scheduler)),
        submitter,
        stats_rx,
        result_rx,
    })
}
