use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Health Reporting
// ============================================================================
//
// The store decides between healthy and unhealthy; the publisher can only
// degrade the service, since orders are still accepted while it is down.
//
// ============================================================================

/// Overall status of the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded(_))
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded(_) => "degraded",
            HealthStatus::Unhealthy(_) => "unhealthy",
        }
    }

    /// Why the service is not healthy, if it isn't.
    pub fn reason(&self) -> Option<&str> {
        match self {
            HealthStatus::Healthy => None,
            HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => Some(reason.as_str()),
        }
    }

    /// Combine component probes into an overall status.
    pub fn evaluate(store_error: Option<String>, publisher_available: Option<bool>) -> Self {
        match (store_error, publisher_available) {
            (Some(err), _) => HealthStatus::Unhealthy(format!("store unreachable: {}", err)),
            (None, Some(false)) => HealthStatus::Degraded("publisher unavailable".to_string()),
            (None, _) => HealthStatus::Healthy,
        }
    }
}

impl Serialize for HealthStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Snapshot returned by the health probe
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub cache_size: usize,
    /// Whether the startup warm-up completed
    pub cache_loaded: bool,
    pub store_reachable: bool,
    /// `None` when publishing is disabled
    pub publisher_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}
