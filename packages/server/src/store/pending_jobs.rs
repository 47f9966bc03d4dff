//! Outbox rows (`pending_jobs`).
//!
//! The insert trigger on `applications` creates these; they are the
//! durable record of "this unit of work was offered to the queue".
//! Transitions out of PENDING are guarded with a status predicate so two
//! consumers can never both claim a row.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[sqlx(type_name = "pending_job_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingJobStatus {
    Pending,
    Enqueued,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct PendingJob {
    pub id: Uuid,
    pub application_id: Uuid,
    pub task_name: String,
    pub job_args: serde_json::Value,
    pub job_kwargs: serde_json::Value,
    pub status: PendingJobStatus,
    pub queue_job_id: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

const COLUMNS: &str = "id, application_id, task_name, job_args, job_kwargs, status, \
     queue_job_id, error_message, retry_count, created_at, updated_at, enqueued_at, processed_at";

impl PendingJob {
    /// Oldest PENDING rows, for the outbox consumer.
    pub async fn find_pending<'e, E>(executor: E, limit: i64) -> Result<Vec<Self>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query_as::<_, Self>(&format!(
            r#"
            SELECT {COLUMNS} FROM pending_jobs
            WHERE status = 'PENDING'
            ORDER BY created_at ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    pub async fn find_for_application<'e, E>(
        executor: E,
        application_id: Uuid,
    ) -> Result<Vec<Self>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM pending_jobs WHERE application_id = $1 ORDER BY created_at DESC"
        ))
        .bind(application_id)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    pub async fn find_by_queue_job_id<'e, E>(
        executor: E,
        queue_job_id: &str,
    ) -> Result<Option<Self>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM pending_jobs WHERE queue_job_id = $1"
        ))
        .bind(queue_job_id)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    /// PENDING → ENQUEUED, conditional on still being PENDING. Returns
    /// false when another path already enqueued the row.
    pub async fn mark_enqueued<'e, E>(
        executor: E,
        id: Uuid,
        queue_job_id: &str,
    ) -> Result<bool, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query(
            r#"
            UPDATE pending_jobs
            SET status = 'ENQUEUED', queue_job_id = $1, enqueued_at = now(), updated_at = now()
            WHERE id = $2 AND status = 'PENDING'
            "#,
        )
        .bind(queue_job_id)
        .bind(id)
        .execute(executor)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Enqueue bookkeeping for the realtime path, keyed by application.
    pub async fn mark_enqueued_for_application<'e, E>(
        executor: E,
        application_id: Uuid,
        queue_job_id: &str,
    ) -> Result<bool, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query(
            r#"
            UPDATE pending_jobs
            SET status = 'ENQUEUED', queue_job_id = $1, enqueued_at = now(), updated_at = now()
            WHERE application_id = $2 AND status = 'PENDING'
            "#,
        )
        .bind(queue_job_id)
        .bind(application_id)
        .execute(executor)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    pub async fn mark_failed<'e, E>(executor: E, id: Uuid, error: &str) -> Result<(), AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE pending_jobs
            SET status = 'FAILED', error_message = $1, updated_at = now()
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// ENQUEUED → PROCESSING when a worker picks the job up.
    pub async fn mark_processing_by_queue_job_id<'e, E>(
        executor: E,
        queue_job_id: &str,
    ) -> Result<bool, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query(
            r#"
            UPDATE pending_jobs
            SET status = 'PROCESSING', updated_at = now()
            WHERE queue_job_id = $1 AND status = 'ENQUEUED'
            "#,
        )
        .bind(queue_job_id)
        .execute(executor)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Success hook: the queue job finished, close out the outbox row.
    pub async fn mark_completed_by_queue_job_id<'e, E>(
        executor: E,
        queue_job_id: &str,
    ) -> Result<bool, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query(
            r#"
            UPDATE pending_jobs
            SET status = 'COMPLETED', processed_at = now(), updated_at = now()
            WHERE queue_job_id = $1 AND status IN ('ENQUEUED', 'PROCESSING')
            "#,
        )
        .bind(queue_job_id)
        .execute(executor)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Failure hook counterpart, keyed by queue job id.
    pub async fn mark_failed_by_queue_job_id<'e, E>(
        executor: E,
        queue_job_id: &str,
        error: &str,
    ) -> Result<Option<Uuid>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE pending_jobs
            SET status = 'FAILED', error_message = $1, updated_at = now()
            WHERE queue_job_id = $2
            RETURNING id
            "#,
        )
        .bind(error)
        .bind(queue_job_id)
        .fetch_optional(executor)
        .await?;
        Ok(id)
    }
}
