//! Engine configuration

use std::time::Duration;

/// Default polling period for condition-driven delays
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for [`WorkflowEngine`](crate::engine::WorkflowEngine)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default period used by condition polling workflows
    pub polling_interval: Duration,

    /// Remove instances from the registry as soon as they complete
    pub remove_completed_immediately: bool,

    /// Capacity of the lifecycle event channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            polling_interval: DEFAULT_POLLING_INTERVAL,
            remove_completed_immediately: false,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `WORKFLOW_POLLING_INTERVAL_MS`: condition polling period (default: 50)
    /// - `WORKFLOW_REMOVE_COMPLETED`: "true" to drop completed instances
    /// - `WORKFLOW_EVENT_CAPACITY`: lifecycle channel capacity (default: 256)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            polling_interval: std::env::var("WORKFLOW_POLLING_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.polling_interval),
            remove_completed_immediately: std::env::var("WORKFLOW_REMOVE_COMPLETED")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.remove_completed_immediately),
            event_capacity: std::env::var("WORKFLOW_EVENT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|c| *c > 0)
                .unwrap_or(defaults.event_capacity),
        }
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn with_remove_completed_immediately(mut self, remove: bool) -> Self {
        self.remove_completed_immediately = remove;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
