//! Configuration types for offline processing

use serde::{Deserialize, Serialize};

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Run jobs on the calling thread inside `process()`
    pub synchronous: bool,

    /// In background mode, accept new work while a job is running
    pub queue_enabled: bool,

    /// Thread name prefix for background workers
    pub worker_name: String,

    /// Sleep between polls in `JobScheduler::wait`
    pub poll_interval_ms: u64,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            synchronous: false,
            queue_enabled: true,
            worker_name: "rf-offline-job".to_string(),
            poll_interval_ms: 5,
        }
    }
}

impl OfflineConfig {
    /// One job at a time, run to completion inside `process()`
    pub fn blocking() -> Self {
        Self {
            synchronous: true,
            ..Default::default()
        }
    }

    /// Background jobs with a FIFO queue
    pub fn queued() -> Self {
        Self {
            synchronous: false,
            queue_enabled: true,
            ..Default::default()
        }
    }

    /// Set blocking mode
    pub fn with_synchronous(mut self, synchronous: bool) -> Self {
        self.synchronous = synchronous;
        self
    }

    /// Enable or disable queueing
    pub fn with_queue(mut self, enabled: bool) -> Self {
        self.queue_enabled = enabled;
        self
    }

    /// Set worker thread name prefix
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Set poll interval for `wait`
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert!(OfflineConfig::blocking().synchronous);
        assert!(!OfflineConfig::queued().synchronous);
        assert!(OfflineConfig::default().queue_enabled);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: OfflineConfig = serde_json::from_str(r#"{"synchronous": true}"#).unwrap();

        assert!(config.synchronous);
        assert_eq!(config.worker_name, "rf-offline-job");
        assert_eq!(config.poll_interval_ms, 5);
    }
}
