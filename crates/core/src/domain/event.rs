// Scheduler events (informational, fire-and-forget)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    ManagerStarting,
    ManagerStopping,
    Starting,
    Running,
    Stopping,
    Completed,
}

impl std::fmt::Display for JobAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobAction::ManagerStarting => write!(f, "manager_starting"),
            JobAction::ManagerStopping => write!(f, "manager_stopping"),
            JobAction::Starting => write!(f, "starting"),
            JobAction::Running => write!(f, "running"),
            JobAction::Stopping => write!(f, "stopping"),
            JobAction::Completed => write!(f, "completed"),
        }
    }
}

/// Run details attached to `JobAction::Completed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    /// None for manager-level events
    pub job_name: Option<String>,
    pub action: JobAction,
    pub run: Option<RunSummary>,
}

impl JobEvent {
    pub fn manager(action: JobAction) -> Self {
        Self {
            job_name: None,
            action,
            run: None,
        }
    }

    pub fn job(name: impl Into<String>, action: JobAction) -> Self {
        Self {
            job_name: Some(name.into()),
            action,
            run: None,
        }
    }

    pub fn completed(name: impl Into<String>, run: RunSummary) -> Self {
        Self {
            job_name: Some(name.into()),
            action: JobAction::Completed,
            run: Some(run),
        }
    }
}
