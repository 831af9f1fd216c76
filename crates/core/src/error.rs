// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Configuration faults are the only errors surfaced to callers of
    /// `JobManager::initialize`/`start`
    pub fn is_configuration_fault(&self) -> bool {
        matches!(self, AppError::Config(_) | AppError::Domain(_))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// sqlx::Error conversion lives in recur-infra-sqlite (orphan rules)
