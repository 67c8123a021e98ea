use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

// ============================================================================
// Health Tracking
// ============================================================================
//
// Long-running tasks (stream consumer, warm-up, store) report their status
// here; the HTTP server exposes the aggregate on /health.
//
// ============================================================================

pub const CONSUMER: &str = "consumer";
pub const WARM_UP: &str = "warm_up";
pub const DATABASE: &str = "database";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

#[derive(Default)]
pub struct HealthRegistry {
    components: Mutex<BTreeMap<String, ComponentHealth>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, component: &str, status: HealthStatus, details: Option<String>) {
        let mut components = self.components.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = components.get(component) {
            if previous.status != status {
                tracing::info!(
                    component = component,
                    from = ?previous.status,
                    to = ?status,
                    "Component health changed"
                );
            }
        }

        components.insert(
            component.to_string(),
            ComponentHealth {
                status,
                last_check: Utc::now(),
                details,
            },
        );
    }

    pub fn snapshot(&self) -> SystemHealth {
        let components = self
            .components
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        SystemHealth {
            overall: overall_status(&components),
            components,
            check_time: Utc::now(),
        }
    }
}

fn overall_status(components: &BTreeMap<String, ComponentHealth>) -> HealthStatus {
    let mut has_degraded = false;
    let mut unhealthy = Vec::new();

    for (name, health) in components {
        match &health.status {
            HealthStatus::Unhealthy(msg) => unhealthy.push(format!("{}: {}", name, msg)),
            HealthStatus::Degraded(_) => has_degraded = true,
            HealthStatus::Healthy => {}
        }
    }

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join(", "))
    } else if has_degraded {
        HealthStatus::Degraded("Some components degraded".to_string())
    } else {
        HealthStatus::Healthy
    }
}
