//! Component health for catalogs and the notification pipeline.
//!
//! Each catalog is tracked as `catalog:<name>`, the notification pipeline as
//! `notifications`. The CLI server renders [`HealthCheck::report`] on
//! `/health` and uses [`HealthCheck::is_ready`] for `/readyz`.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// Component name used for the notification pipeline.
pub const NOTIFICATIONS_COMPONENT: &str = "notifications";

/// Component name for a catalog.
pub fn catalog_component(catalog: &str) -> String {
    format!("catalog:{}", catalog)
}

/// Health status of a component.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
    Unknown,
}

/// Overall system health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Snapshot served on `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub ready: bool,
    pub uptime_seconds: u64,
    pub components: BTreeMap<String, ComponentStatus>,
}

/// Health registry shared by the server and the background checks.
pub struct HealthCheck {
    components: RwLock<BTreeMap<String, ComponentStatus>>,
    started_at: Instant,
    ready: RwLock<bool>,
}

impl HealthCheck {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(BTreeMap::new()),
            started_at: Instant::now(),
            ready: RwLock::new(false),
        }
    }

    /// Register a component with unknown status.
    pub fn register_component(&self, name: &str) {
        self.components
            .write()
            .entry(name.to_string())
            .or_insert(ComponentStatus::Unknown);
    }

    pub fn mark_healthy(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy);
    }

    pub fn mark_degraded(&self, name: &str, reason: &str) {
        self.set(name, ComponentStatus::Degraded(reason.to_string()));
    }

    pub fn mark_unhealthy(&self, name: &str, reason: &str) {
        self.set(name, ComponentStatus::Unhealthy(reason.to_string()));
    }

    /// Record the outcome of a connector health probe.
    ///
    /// A retryable failure degrades the catalog; anything else marks it
    /// unhealthy since retrying will not help.
    pub fn record_probe(&self, name: &str, result: &crate::CatalogResult<()>) {
        match result {
            Ok(()) => self.mark_healthy(name),
            Err(e) if e.is_retryable() => self.mark_degraded(name, &e.to_string()),
            Err(e) => self.mark_unhealthy(name, &e.to_string()),
        }
    }

    fn set(&self, name: &str, status: ComponentStatus) {
        self.components.write().insert(name.to_string(), status);
    }

    pub fn get_component_status(&self, name: &str) -> Option<ComponentStatus> {
        self.components.read().get(name).cloned()
    }

    pub fn overall_status(&self) -> HealthStatus {
        let components = self.components.read();
        let mut status = HealthStatus::Healthy;
        for component in components.values() {
            match component {
                ComponentStatus::Unhealthy(_) => return HealthStatus::Unhealthy,
                ComponentStatus::Degraded(_) => status = HealthStatus::Degraded,
                ComponentStatus::Healthy | ComponentStatus::Unknown => {}
            }
        }
        status
    }

    /// Healthy or degraded.
    pub fn is_operational(&self) -> bool {
        self.overall_status() != HealthStatus::Unhealthy
    }

    /// Set once the connector registry is built and serving.
    pub fn set_ready(&self, ready: bool) {
        *self.ready.write() = ready;
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.read() && self.is_operational()
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            status: self.overall_status(),
            ready: self.is_ready(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            components: self.components.read().clone(),
        }
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}
