//! Alert engine initialization.
//!
//! The engine polls the shared [`MetricRegistry`] that the classification
//! handler records into; its notifications go to the orchestrator's logger.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use logwarden_alerting::{AlertEngineBuilder, AlertNotification, AlertingConfig, MetricRegistry};
use logwarden_core::config::LogwardenConfig;

use super::ModuleHandle;

/// Alert engine handle plus its notification stream.
pub struct AlertingParts {
    /// Lifecycle handle.
    pub handle: ModuleHandle,
    /// Alert notifications.
    pub notification_rx: mpsc::Receiver<AlertNotification>,
}

/// Build the alert engine. Returns `None` when alerting is disabled.
pub fn init(config: &LogwardenConfig, registry: &MetricRegistry) -> Result<Option<AlertingParts>> {
    if !config.alerting.enabled {
        tracing::info!("alert engine disabled in configuration");
        return Ok(None);
    }

    let alerting_config = AlertingConfig::from_core(&config.alerting);
    let (engine, notification_rx) = AlertEngineBuilder::new()
        .config(alerting_config)
        .source(Arc::new(registry.clone()))
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build alert engine: {e}"))?;
    let notification_rx = notification_rx
        .ok_or_else(|| anyhow::anyhow!("alert engine did not return a notification channel"))?;

    tracing::info!("alert engine initialized");
    Ok(Some(AlertingParts {
        handle: ModuleHandle::new("alerting", true, Box::new(engine)),
        notification_rx,
    }))
}
