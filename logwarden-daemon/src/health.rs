//! Aggregated health check reporting.
//!
//! The overall daemon status is the worst status among all enabled
//! modules: Unhealthy > Degraded > Healthy.

use serde::Serialize;

use logwarden_core::pipeline::HealthStatus;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon health status (worst of all modules).
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Per-module health reports.
    pub modules: Vec<ModuleHealth>,
}

/// Health status for a single module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    /// Module name (e.g., "scheduler", "cache").
    pub name: String,
    /// Whether the module is enabled in configuration.
    pub enabled: bool,
    /// Current health status of the module.
    pub status: HealthStatus,
}

/// Aggregate module health statuses into a single status.
///
/// Disabled modules are ignored. Reasons are joined as `name: reason`.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let mut degraded = Vec::new();
    let mut unhealthy = Vec::new();

    for module in modules.iter().filter(|m| m.enabled) {
        match &module.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => degraded.push(format!("{}: {reason}", module.name)),
            HealthStatus::Unhealthy(reason) => {
                unhealthy.push(format!("{}: {reason}", module.name));
            }
        }
    }

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join("; "))
    } else if !degraded.is_empty() {
        HealthStatus::Degraded(degraded.join("; "))
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, enabled: bool, status: HealthStatus) -> ModuleHealth {
        ModuleHealth {
            name: name.to_owned(),
            enabled,
            status,
        }
    }

    #[test]
    fn all_healthy() {
        let modules = vec![
            module("scheduler", true, HealthStatus::Healthy),
            module("alerting", true, HealthStatus::Healthy),
        ];
        assert_eq!(aggregate_status(&modules), HealthStatus::Healthy);
    }

    #[test]
    fn empty_is_healthy() {
        assert_eq!(aggregate_status(&[]), HealthStatus::Healthy);
    }

    #[test]
    fn degraded_reason_is_prefixed() {
        let modules = vec![
            module("scheduler", true, HealthStatus::Degraded("queue backlog".to_owned())),
            module("cache", true, HealthStatus::Healthy),
        ];
        assert_eq!(
            aggregate_status(&modules),
            HealthStatus::Degraded("scheduler: queue backlog".to_owned())
        );
    }

    #[test]
    fn unhealthy_wins_over_degraded() {
        let modules = vec![
            module("scheduler", true, HealthStatus::Degraded("slow".to_owned())),
            module("cache", true, HealthStatus::Unhealthy("redis down".to_owned())),
        ];
        assert_eq!(
            aggregate_status(&modules),
            HealthStatus::Unhealthy("cache: redis down".to_owned())
        );
    }

    #[test]
    fn disabled_modules_ignored() {
        let modules = vec![
            module("alerting", false, HealthStatus::Unhealthy("not started".to_owned())),
            module("scheduler", true, HealthStatus::Healthy),
        ];
        assert_eq!(aggregate_status(&modules), HealthStatus::Healthy);
    }
}
