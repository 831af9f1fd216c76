// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Duplicate job name: {0}")]
    DuplicateJob(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Unknown {kind} provider: {name}")]
    UnknownProvider { kind: &'static str, name: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
