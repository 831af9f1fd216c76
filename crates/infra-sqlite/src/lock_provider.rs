// SQLite Lock Provider
// Cross-process job locks: every process sharing the database file competes
// for the same rows in job_locks

use async_trait::async_trait;
use recur_core::domain::JobLock;
use recur_core::error::Result;
use recur_core::port::{LockProvider, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::map_sqlx_error;

/// Locks older than this are treated as abandoned by a crashed holder
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(60 * 60);

pub struct SqliteLockProvider {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
    owner: String,
    ttl: Duration,
}

impl SqliteLockProvider {
    /// Provider with a fresh owner id (`<pid>:<uuid>`)
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        let owner = format!("{}:{}", std::process::id(), uuid::Uuid::new_v4());
        Self {
            pool,
            time_provider,
            owner,
            ttl: DEFAULT_LOCK_TTL,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Remove locks past the TTL, whoever holds them
    async fn purge_stale(&self, name: &str, now_millis: i64) -> Result<()> {
        let cutoff = now_millis - self.ttl.as_millis() as i64;
        let purged = sqlx::query("DELETE FROM job_locks WHERE name = ? AND acquired_at < ?")
            .bind(name)
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        if purged > 0 {
            warn!(lock = %name, "Purged stale lock");
        }
        Ok(())
    }
}

#[async_trait]
impl LockProvider for SqliteLockProvider {
    async fn acquire(&self, name: &str) -> Result<JobLock> {
        let now = self.time_provider.now_millis();
        self.purge_stale(name, now).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO job_locks (name, owner, acquired_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(&self.owner)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if inserted == 1 {
            debug!(lock = %name, owner = %self.owner, "Lock acquired");
            Ok(JobLock::acquired(name))
        } else {
            debug!(lock = %name, "Lock held by another owner");
            Ok(JobLock::denied(name))
        }
    }

    async fn release(&self, lock: JobLock) -> Result<()> {
        if !lock.is_acquired() {
            return Ok(());
        }

        let deleted = sqlx::query("DELETE FROM job_locks WHERE name = ? AND owner = ?")
            .bind(lock.name())
            .bind(&self.owner)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        if deleted == 0 {
            // Purged as stale and possibly re-taken by someone else
            info!(lock = %lock.name(), "Lock no longer held at release");
        } else {
            debug!(lock = %lock.name(), "Lock released");
        }
        Ok(())
    }
}
