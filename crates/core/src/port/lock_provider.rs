// Lock Provider Port
// Named mutual exclusion between jobs, processes or hosts sharing a provider

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

use crate::domain::JobLock;
use crate::error::Result;

/// Grants and releases named locks.
///
/// Must be safe under concurrent calls from every job sharing the instance.
/// The in-process implementation below is the reference; a distributed
/// implementation only needs to honour the same acquire/release contract.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Try to take the lock. Contention is reported through
    /// `JobLock::is_acquired`, not as an error.
    async fn acquire(&self, name: &str) -> Result<JobLock>;

    /// Release a lock previously returned by `acquire`.
    async fn release(&self, lock: JobLock) -> Result<()>;
}

/// In-process lock provider: a set of held names behind one mutex
#[derive(Default)]
pub struct InMemoryLockProvider {
    held: Mutex<HashSet<String>>,
}

impl InMemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(name)
    }
}

#[async_trait]
impl LockProvider for InMemoryLockProvider {
    async fn acquire(&self, name: &str) -> Result<JobLock> {
        let mut held = self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if held.insert(name.to_string()) {
            debug!(lock = %name, "Lock acquired");
            Ok(JobLock::acquired(name))
        } else {
            debug!(lock = %name, "Lock already held");
            Ok(JobLock::denied(name))
        }
    }

    async fn release(&self, lock: JobLock) -> Result<()> {
        if !lock.is_acquired() {
            return Ok(());
        }

        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(lock.name());
        debug!(lock = %lock.name(), "Lock released");
        Ok(())
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Lock provider that never grants a lock
    #[derive(Default)]
    pub struct DenyingLockProvider {
        pub attempts: AtomicUsize,
    }

    #[async_trait]
    impl LockProvider for DenyingLockProvider {
        async fn acquire(&self, name: &str) -> Result<JobLock> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Ok(JobLock::denied(name))
        }

        async fn release(&self, _lock: JobLock) -> Result<()> {
            Ok(())
        }
    }

    /// Lock provider whose backing store is unreachable
    pub struct FailingLockProvider;

    #[async_trait]
    impl LockProvider for FailingLockProvider {
        async fn acquire(&self, _name: &str) -> Result<JobLock> {
            Err(AppError::Database("lock store unavailable".to_string()))
        }

        async fn release(&self, _lock: JobLock) -> Result<()> {
            Err(AppError::Database("lock store unavailable".to_string()))
        }
    }
}
