// History Provider Port
// Persists and restores the last-run outcome of a job

use async_trait::async_trait;

use crate::domain::JobHistory;
use crate::error::Result;

/// History persistence interface
///
/// `restore_history` is called once when a job is constructed,
/// `save_history` after every run regardless of outcome. Errors are logged
/// by the caller and never affect scheduling.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Load the last recorded outcome for `job_name`, if any
    async fn restore_history(&self, job_name: &str) -> Result<Option<JobHistory>>;

    /// Record the outcome of the run that just finished
    async fn save_history(&self, history: &JobHistory) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// History kept in a map, shared by every job using the instance
    #[derive(Default)]
    pub struct InMemoryHistoryProvider {
        entries: Mutex<HashMap<String, JobHistory>>,
        pub saves: AtomicUsize,
    }

    impl InMemoryHistoryProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get(&self, job_name: &str) -> Option<JobHistory> {
            self.entries.lock().unwrap().get(job_name).cloned()
        }

        pub fn save_count(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HistoryProvider for InMemoryHistoryProvider {
        async fn restore_history(&self, job_name: &str) -> Result<Option<JobHistory>> {
            Ok(self.get(job_name))
        }

        async fn save_history(&self, history: &JobHistory) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.entries
                .lock()
                .unwrap()
                .insert(history.job_name.clone(), history.clone());
            Ok(())
        }
    }

    /// History provider whose storage always fails
    #[derive(Default)]
    pub struct FailingHistoryProvider {
        pub saves: AtomicUsize,
    }

    #[async_trait]
    impl HistoryProvider for FailingHistoryProvider {
        async fn restore_history(&self, _job_name: &str) -> Result<Option<JobHistory>> {
            Err(AppError::Database("history store unavailable".to_string()))
        }

        async fn save_history(&self, _history: &JobHistory) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Database("history store unavailable".to_string()))
        }
    }
}
