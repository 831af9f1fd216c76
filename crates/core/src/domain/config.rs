// Scheduler configuration (loaded by a ConfigProvider)

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::job::JobConfiguration;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_STOP_TIMEOUT_SECS: u64 = 30;

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_stop_timeout_secs() -> u64 {
    DEFAULT_STOP_TIMEOUT_SECS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Statically configured jobs
    #[serde(default)]
    pub jobs: Vec<JobConfiguration>,

    /// Registry names of the task providers contributing dynamic jobs
    #[serde(default)]
    pub task_providers: Vec<String>,

    /// How often task providers are asked whether they need a reload
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound on how long `stop` waits for in-flight runs
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            jobs: Vec::new(),
            task_providers: Vec::new(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_fields_missing() {
        let config: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SchedulerConfig::default());
        assert_eq!(config.stop_timeout(), Duration::from_secs(30));
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let config = SchedulerConfig {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }
}
