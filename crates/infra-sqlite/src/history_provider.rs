// SQLite History Provider
// One row per job name; every save overwrites the previous outcome

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recur_core::domain::{JobHistory, JobStatus};
use recur_core::error::Result;
use recur_core::port::{HistoryProvider, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::map_sqlx_error;

pub struct SqliteHistoryProvider {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteHistoryProvider {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl HistoryProvider for SqliteHistoryProvider {
    async fn restore_history(&self, job_name: &str) -> Result<Option<JobHistory>> {
        let row = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT job_name, last_status, last_result, last_run_started_at, last_run_finished_at
            FROM job_history
            WHERE job_name = ?
            "#,
        )
        .bind(job_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(HistoryRow::into_history))
    }

    async fn save_history(&self, history: &JobHistory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO job_history (
                job_name, last_status, last_result,
                last_run_started_at, last_run_finished_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_name) DO UPDATE SET
                last_status = excluded.last_status,
                last_result = excluded.last_result,
                last_run_started_at = excluded.last_run_started_at,
                last_run_finished_at = excluded.last_run_finished_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&history.job_name)
        .bind(history.last_status.to_string())
        .bind(&history.last_result)
        .bind(history.last_run_started_at.map(|t| t.timestamp_millis()))
        .bind(history.last_run_finished_at.map(|t| t.timestamp_millis()))
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(job = %history.job_name, status = %history.last_status, "History saved");
        Ok(())
    }
}

/// SQLite row representation (timestamps in epoch millis)
#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    job_name: String,
    last_status: String,
    last_result: String,
    last_run_started_at: Option<i64>,
    last_run_finished_at: Option<i64>,
}

impl HistoryRow {
    fn into_history(self) -> JobHistory {
        let last_status = self.last_status.parse().unwrap_or_else(|_| {
            warn!(job = %self.job_name, status = %self.last_status, "Unknown stored status");
            JobStatus::None
        });

        JobHistory {
            job_name: self.job_name,
            last_status,
            last_result: self.last_result,
            last_run_started_at: self.last_run_started_at.and_then(from_millis),
            last_run_finished_at: self.last_run_finished_at.and_then(from_millis),
        }
    }
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}
