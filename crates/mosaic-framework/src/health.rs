//! Aggregated health of a composite.

use mosaic_core::{HealthStatus, PluginId};

/// Health of a single module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHealth {
    pub plugin: PluginId,
    pub module: String,
    pub status: HealthStatus,
}

/// Result of `Composite::health_check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// Worst status across all modules, or `Unhealthy` when not started.
    pub status: HealthStatus,
    /// Readiness flag at the time of the check.
    pub ready: bool,
    /// Per-module results. Empty when the composite is not started.
    pub modules: Vec<ModuleHealth>,
}

impl HealthReport {
    pub(crate) fn not_started() -> Self {
        Self {
            status: HealthStatus::Unhealthy("composite is not started".into()),
            ready: false,
            modules: Vec::new(),
        }
    }

    pub(crate) fn from_modules(ready: bool, modules: Vec<ModuleHealth>) -> Self {
        let status = modules
            .iter()
            .map(|m| &m.status)
            .max_by_key(|s| severity(s))
            .filter(|s| !s.is_healthy())
            .cloned()
            .unwrap_or(HealthStatus::Healthy);
        Self {
            status,
            ready,
            modules,
        }
    }

    /// Returns `true` when every module reported healthy.
    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }
}

fn severity(status: &HealthStatus) -> u8 {
    match status {
        HealthStatus::Healthy => 0,
        HealthStatus::Degraded(_) => 1,
        HealthStatus::Unhealthy(_) => 2,
    }
}
