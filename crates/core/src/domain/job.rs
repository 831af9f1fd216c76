// Job Domain Model

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::error::{DomainError, Result};

/// Job ID (UUID v4, generated per constructed Job)
pub type JobId = String;

/// Arguments handed to every run of a job
pub type JobArguments = HashMap<String, serde_json::Value>;

/// Job Status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    None,
    Stopped,
    Running,
    Waiting,
    Error,
    Completed,
    Canceled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::None => write!(f, "NONE"),
            JobStatus::Stopped => write!(f, "STOPPED"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Waiting => write!(f, "WAITING"),
            JobStatus::Error => write!(f, "ERROR"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Canceled => write!(f, "CANCELED"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NONE" => Ok(JobStatus::None),
            "STOPPED" => Ok(JobStatus::Stopped),
            "RUNNING" => Ok(JobStatus::Running),
            "WAITING" => Ok(JobStatus::Waiting),
            "ERROR" => Ok(JobStatus::Error),
            "COMPLETED" => Ok(JobStatus::Completed),
            "CANCELED" => Ok(JobStatus::Canceled),
            other => Err(DomainError::ValidationError(format!(
                "Unknown job status: {}",
                other
            ))),
        }
    }
}

/// When a job fires
///
/// ```text
/// schedule = { mode = "interval", seconds = 30 }
/// schedule = { mode = "time_of_day", at = "02:00:00" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum JobSchedule {
    /// Fixed delay between the end of one run and the next fire
    Interval { seconds: u64 },
    /// Pinned to a local clock time once per day
    TimeOfDay { at: NaiveTime },
}

impl JobSchedule {
    pub fn every(interval: Duration) -> Self {
        JobSchedule::Interval {
            seconds: interval.as_secs(),
        }
    }

    pub fn daily_at(hour: u32, minute: u32, second: u32) -> Result<Self> {
        NaiveTime::from_hms_opt(hour, minute, second)
            .map(|at| JobSchedule::TimeOfDay { at })
            .ok_or_else(|| {
                DomainError::ValidationError(format!(
                    "Invalid time of day: {:02}:{:02}:{:02}",
                    hour, minute, second
                ))
            })
    }

    pub fn is_time_of_day(&self) -> bool {
        matches!(self, JobSchedule::TimeOfDay { .. })
    }
}

/// Job Configuration (external input, immutable once handed to a Job)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfiguration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub group: String,

    /// Registry key of the task factory
    pub task_type: String,
    pub schedule: JobSchedule,

    /// Retain the constructed task instance between runs
    #[serde(default)]
    pub keep_alive: bool,
    #[serde(default)]
    pub arguments: JobArguments,

    /// Registry key of the lock provider (default in-memory provider if absent)
    #[serde(default)]
    pub lock_provider: Option<String>,
    /// Registry key of the history provider (no persistence if absent)
    #[serde(default)]
    pub history_provider: Option<String>,
}

impl JobConfiguration {
    pub fn new(
        name: impl Into<String>,
        task_type: impl Into<String>,
        schedule: JobSchedule,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            group: String::new(),
            task_type: task_type.into(),
            schedule,
            keep_alive: false,
            arguments: JobArguments::new(),
            lock_provider: None,
            history_provider: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    pub fn with_lock_provider(mut self, provider: impl Into<String>) -> Self {
        self.lock_provider = Some(provider.into());
        self
    }

    pub fn with_history_provider(mut self, provider: impl Into<String>) -> Self {
        self.history_provider = Some(provider.into());
        self
    }

    /// Reject configurations that can never be scheduled
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Job name must not be empty".to_string(),
            ));
        }
        if self.task_type.trim().is_empty() {
            return Err(DomainError::ValidationError(format!(
                "Job {} has no task type",
                self.name
            )));
        }
        if let JobSchedule::Interval { seconds: 0 } = self.schedule {
            return Err(DomainError::ValidationError(format!(
                "Job {} has a zero interval",
                self.name
            )));
        }
        Ok(())
    }
}

/// Last-run outcome of a job, as persisted by a history provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHistory {
    pub job_name: String,
    pub last_status: JobStatus,
    pub last_result: String,
    pub last_run_started_at: Option<DateTime<Utc>>,
    pub last_run_finished_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of a job's run-state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub name: String,
    pub group: String,
    pub description: String,
    pub status: JobStatus,
    pub last_status: JobStatus,
    pub last_result: String,
    pub last_run_started_at: Option<DateTime<Utc>>,
    pub last_run_finished_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub is_busy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            JobStatus::None,
            JobStatus::Stopped,
            JobStatus::Running,
            JobStatus::Waiting,
            JobStatus::Error,
            JobStatus::Completed,
            JobStatus::Canceled,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("BOGUS".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_schedule_deserializes_both_modes() {
        let interval: JobSchedule =
            serde_json::from_value(serde_json::json!({"mode": "interval", "seconds": 30}))
                .unwrap();
        assert_eq!(interval, JobSchedule::Interval { seconds: 30 });

        let daily: JobSchedule =
            serde_json::from_value(serde_json::json!({"mode": "time_of_day", "at": "02:00:00"}))
                .unwrap();
        assert_eq!(daily, JobSchedule::daily_at(2, 0, 0).unwrap());
        assert!(daily.is_time_of_day());
    }

    #[test]
    fn test_daily_at_rejects_out_of_range() {
        assert!(JobSchedule::daily_at(24, 0, 0).is_err());
        assert!(JobSchedule::daily_at(23, 60, 0).is_err());
    }

    #[test]
    fn test_validate() {
        let ok = JobConfiguration::new("Cleanup", "command", JobSchedule::every(Duration::from_secs(30)));
        assert!(ok.validate().is_ok());

        let zero = JobConfiguration::new("Cleanup", "command", JobSchedule::Interval { seconds: 0 });
        assert!(matches!(zero.validate(), Err(DomainError::ValidationError(_))));

        let unnamed = JobConfiguration::new(" ", "command", JobSchedule::every(Duration::from_secs(1)));
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_configuration_defaults_from_json() {
        let config: JobConfiguration = serde_json::from_value(serde_json::json!({
            "name": "Cleanup",
            "task_type": "command",
            "schedule": {"mode": "interval", "seconds": 30}
        }))
        .unwrap();

        assert!(!config.keep_alive);
        assert!(config.arguments.is_empty());
        assert!(config.lock_provider.is_none());
        assert!(config.history_provider.is_none());
        assert_eq!(config.group, "");
    }
}
