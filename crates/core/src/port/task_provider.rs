// Task Provider Port
// A reloadable source of dynamic job configurations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::domain::JobConfiguration;
use crate::error::Result;

#[async_trait]
pub trait TaskProvider: Send + Sync {
    /// Current set of job configurations
    async fn get_jobs(&self) -> Result<Vec<JobConfiguration>>;

    /// Whether the jobs changed since `last_load_time`
    async fn is_reload_required(&self, last_load_time: DateTime<Utc>) -> bool;

    /// Whether the manager should poll `is_reload_required` at all
    fn wants_reload_checks(&self) -> bool {
        true
    }
}

/// Task provider fed programmatically; replacing its jobs flags a reload
#[derive(Default)]
pub struct StaticTaskProvider {
    jobs: RwLock<Vec<JobConfiguration>>,
    dirty: AtomicBool,
}

impl StaticTaskProvider {
    pub fn new(jobs: Vec<JobConfiguration>) -> Self {
        Self {
            jobs: RwLock::new(jobs),
            dirty: AtomicBool::new(false),
        }
    }

    /// Swap in a new job set; picked up on the next reload poll
    pub fn replace_jobs(&self, jobs: Vec<JobConfiguration>) {
        *self
            .jobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = jobs;
        self.dirty.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskProvider for StaticTaskProvider {
    async fn get_jobs(&self) -> Result<Vec<JobConfiguration>> {
        self.dirty.store(false, Ordering::SeqCst);
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    async fn is_reload_required(&self, _last_load_time: DateTime<Utc>) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }
}
