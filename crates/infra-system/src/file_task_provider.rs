// JSON file task provider
// Jobs come from a JSON array of job configurations; a newer modification
// time than the last load means the jobs changed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use recur_core::domain::JobConfiguration;
use recur_core::error::{AppError, Result};
use recur_core::port::TaskProvider;

pub struct FileTaskProvider {
    path: PathBuf,
    /// Whether the file existed at the last `get_jobs`
    seen_file: AtomicBool,
}

impl FileTaskProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seen_file: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn modified_at(&self) -> std::io::Result<DateTime<Utc>> {
        let modified = tokio::fs::metadata(&self.path).await?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }
}

#[async_trait]
impl TaskProvider for FileTaskProvider {
    /// Missing file yields no jobs
    async fn get_jobs(&self) -> Result<Vec<JobConfiguration>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Job file not found, no jobs");
                self.seen_file.store(false, Ordering::SeqCst);
                return Ok(Vec::new());
            }
            Err(e) => return Err(AppError::Io(e)),
        };
        self.seen_file.store(true, Ordering::SeqCst);

        let jobs: Vec<JobConfiguration> = serde_json::from_str(&text).map_err(|e| {
            AppError::Config(format!("{}: {}", self.path.display(), e))
        })?;
        debug!(path = %self.path.display(), jobs = jobs.len(), "Job file loaded");
        Ok(jobs)
    }

    async fn is_reload_required(&self, last_load_time: DateTime<Utc>) -> bool {
        match self.modified_at().await {
            Ok(modified) => modified > last_load_time || !self.seen_file.load(Ordering::SeqCst),
            // Deleted since the last load: its jobs must go
            Err(e) if e.kind() == ErrorKind::NotFound => self.seen_file.load(Ordering::SeqCst),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot stat job file");
                false
            }
        }
    }
}
