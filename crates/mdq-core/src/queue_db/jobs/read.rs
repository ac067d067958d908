//! Job read operations: load, get, list, id high-water mark.

use anyhow::Result;
use sqlx::Row;

use super::super::db::QueueDb;
use super::super::types::{job_from_row, JOB_COLUMNS};
use crate::job::{Job, JobId, JobState};

impl QueueDb {
    /// Every job in id (submission) order.
    pub async fn load_all(&self) -> Result<Vec<Job>> {
        let sql = format!("SELECT {} FROM jobs ORDER BY id ASC", JOB_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(job_from_row).collect()
    }

    pub async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// Jobs in id order, optionally only those in `filter`.
    pub async fn list(&self, filter: Option<JobState>) -> Result<Vec<Job>> {
        let Some(state) = filter else {
            return self.load_all().await;
        };
        let sql = format!(
            "SELECT {} FROM jobs WHERE state = ?1 ORDER BY id ASC",
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Lowest id a new job may take: above every id ever assigned, including
    /// removed ones.
    pub async fn next_id(&self) -> Result<JobId> {
        let seq: Option<i64> =
            sqlx::query(r#"SELECT seq FROM sqlite_sequence WHERE name = 'jobs'"#)
                .fetch_optional(&self.pool)
                .await?
                .map(|row| row.get("seq"));
        let max: Option<i64> = sqlx::query(r#"SELECT MAX(id) AS max_id FROM jobs"#)
            .fetch_one(&self.pool)
            .await?
            .get("max_id");
        Ok(seq.unwrap_or(0).max(max.unwrap_or(0)) + 1)
    }
}
