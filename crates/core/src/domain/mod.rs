// Domain Layer - scheduling entities and value types

pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod lock;

// Re-exports
pub use config::SchedulerConfig;
pub use error::DomainError;
pub use event::{JobAction, JobEvent, RunSummary};
pub use job::{
    JobArguments, JobConfiguration, JobHistory, JobId, JobSchedule, JobSnapshot, JobStatus,
};
pub use lock::JobLock;
