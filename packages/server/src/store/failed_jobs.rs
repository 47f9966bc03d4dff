//! Dead-letter queue (`failed_jobs`).
//!
//! Jobs land here after exhausting queue retries (or immediately for
//! permanent failures). `is_retryable` marks rows the retry scheduler may
//! re-enqueue.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[sqlx(type_name = "failed_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailedJobStatus {
    Pending,
    Reviewed,
    Reprocessed,
    Ignored,
    Retried,
}

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct FailedJob {
    pub id: Uuid,
    pub pending_job_id: Option<Uuid>,
    pub queue_job_id: String,
    pub task_name: String,
    pub job_args: serde_json::Value,
    pub job_kwargs: serde_json::Value,
    pub error_type: String,
    pub error_message: String,
    pub error_traceback: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub status: FailedJobStatus,
    pub is_retryable: bool,
    pub reprocessed_job_id: Option<String>,
    pub reprocessed_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFailedJob {
    pub pending_job_id: Option<Uuid>,
    pub queue_job_id: String,
    pub task_name: String,
    pub job_args: serde_json::Value,
    pub job_kwargs: serde_json::Value,
    pub error_type: String,
    pub error_message: String,
    pub error_traceback: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub is_retryable: bool,
    pub metadata: serde_json::Value,
}

const COLUMNS: &str = "id, pending_job_id, queue_job_id, task_name, job_args, job_kwargs, \
     error_type, error_message, error_traceback, retry_count, max_retries, status, \
     is_retryable, reprocessed_job_id, reprocessed_at, metadata, created_at, updated_at";

impl FailedJob {
    /// Record a dead-lettered job. Re-recording the same queue job id
    /// refreshes the error context instead of failing.
    pub async fn insert<'e, E>(executor: E, new: &NewFailedJob) -> Result<Self, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query_as::<_, Self>(&format!(
            r#"
            INSERT INTO failed_jobs (
                pending_job_id, queue_job_id, task_name, job_args, job_kwargs,
                error_type, error_message, error_traceback, retry_count,
                max_retries, is_retryable, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (queue_job_id) DO UPDATE SET
                error_type = EXCLUDED.error_type,
                error_message = EXCLUDED.error_message,
                error_traceback = EXCLUDED.error_traceback,
                retry_count = EXCLUDED.retry_count,
                is_retryable = EXCLUDED.is_retryable,
                metadata = EXCLUDED.metadata,
                updated_at = now()
            RETURNING {COLUMNS}
            "#
        ))
        .bind(new.pending_job_id)
        .bind(&new.queue_job_id)
        .bind(&new.task_name)
        .bind(&new.job_args)
        .bind(&new.job_kwargs)
        .bind(&new.error_type)
        .bind(&new.error_message)
        .bind(&new.error_traceback)
        .bind(new.retry_count)
        .bind(new.max_retries)
        .bind(new.is_retryable)
        .bind(&new.metadata)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    /// Oldest rows eligible for the retry scheduler.
    pub async fn find_retryable<'e, E>(executor: E, limit: i64) -> Result<Vec<Self>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query_as::<_, Self>(&format!(
            r#"
            SELECT {COLUMNS} FROM failed_jobs
            WHERE is_retryable AND status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Record a successful re-enqueue by the retry scheduler.
    pub async fn mark_retried<'e, E>(
        executor: E,
        id: Uuid,
        reprocessed_job_id: &str,
    ) -> Result<(), AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE failed_jobs
            SET status = 'retried', reprocessed_job_id = $1, reprocessed_at = now(),
                updated_at = now()
            WHERE id = $2
            "#,
        )
        .bind(reprocessed_job_id)
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }
}
