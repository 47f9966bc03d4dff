//! Database-backed work queue.
//!
//! Enqueue is `INSERT ... ON CONFLICT (job_id) DO NOTHING`: offering the
//! same job id twice is safe and reports a duplicate. Claiming uses
//! `FOR UPDATE SKIP LOCKED` with a lease; stale RUNNING rows whose lease
//! expired are reclaimed by the next poll, so a crashed worker's jobs are
//! retried without intervention.

use std::time::Duration;

use sqlx::PgPool;

use crate::common::errors::AppError;

use super::backoff::Backoff;
use super::queue_job::QueueJob;

const QUEUE_JOB_COLUMNS: &str = "id, job_id, task_name, args, status, attempt, max_tries, \
     next_run_at, lease_expires_at, worker_id, error_message, created_at, updated_at";

#[derive(Debug)]
pub enum EnqueueOutcome {
    Enqueued(QueueJob),
    /// A job with this id already exists; treated as success by callers.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Transient failure, re-scheduled with backoff.
    Retried,
    /// Out of attempts or permanently failed; the DLQ hook should run.
    DeadLettered,
}

pub struct PostgresQueue {
    pool: PgPool,
    max_tries: i32,
    backoff: Backoff,
}

impl PostgresQueue {
    pub fn new(pool: PgPool, max_tries: i32, backoff: Backoff) -> Self {
        PostgresQueue {
            pool,
            max_tries,
            backoff,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Offer a job to the queue. Duplicate job ids are suppressed natively
    /// by the unique constraint.
    pub async fn enqueue(
        &self,
        job_id: &str,
        task_name: &str,
        args: serde_json::Value,
    ) -> Result<EnqueueOutcome, AppError> {
        let inserted = sqlx::query_as::<_, QueueJob>(&format!(
            r#"
            INSERT INTO queue_jobs (job_id, task_name, args, max_tries)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (job_id) DO NOTHING
            RETURNING {QUEUE_JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(task_name)
        .bind(&args)
        .bind(self.max_tries)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(job) => Ok(EnqueueOutcome::Enqueued(job)),
            None => {
                tracing::debug!(job_id, "duplicate enqueue suppressed");
                Ok(EnqueueOutcome::Duplicate)
            }
        }
    }

    /// Claim up to `limit` runnable jobs, bumping their attempt counter and
    /// taking a lease. Also recovers RUNNING rows whose lease expired.
    pub async fn claim_batch(
        &self,
        worker_id: &str,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<QueueJob>, AppError> {
        let jobs = sqlx::query_as::<_, QueueJob>(&format!(
            r#"
            WITH next_jobs AS (
                SELECT id
                FROM queue_jobs
                WHERE (status = 'pending' AND next_run_at <= now())
                   OR (status = 'running' AND lease_expires_at < now())
                ORDER BY next_run_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE queue_jobs
            SET status = 'running',
                attempt = attempt + 1,
                lease_expires_at = now() + make_interval(secs => $2),
                worker_id = $3,
                updated_at = now()
            WHERE id IN (SELECT id FROM next_jobs)
            RETURNING {QUEUE_JOB_COLUMNS}
            "#
        ))
        .bind(limit)
        .bind(lease.as_secs_f64())
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    /// Extend the lease of a running job (heartbeat).
    pub async fn heartbeat(&self, job: &QueueJob, lease: Duration) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE queue_jobs
            SET lease_expires_at = now() + make_interval(secs => $1),
                updated_at = now()
            WHERE id = $2 AND status = 'running'
            "#,
        )
        .bind(lease.as_secs_f64())
        .bind(job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_succeeded(&self, job: &QueueJob) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE queue_jobs SET status = 'succeeded', updated_at = now() WHERE id = $1",
        )
        .bind(job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failure. Permanent failures and exhausted attempts go
    /// terminal; anything else is re-scheduled with exponential backoff.
    pub async fn mark_failed(
        &self,
        job: &QueueJob,
        error_message: &str,
        permanent: bool,
    ) -> Result<FailOutcome, AppError> {
        if permanent || job.is_final_attempt() {
            sqlx::query(
                r#"
                UPDATE queue_jobs
                SET status = 'dead_letter', error_message = $1, updated_at = now()
                WHERE id = $2
                "#,
            )
            .bind(error_message)
            .bind(job.id)
            .execute(&self.pool)
            .await?;
            return Ok(FailOutcome::DeadLettered);
        }

        let delay = self.backoff.delay(&job.job_id, job.attempt);
        sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'pending',
                error_message = $1,
                next_run_at = now() + make_interval(secs => $2),
                lease_expires_at = NULL,
                worker_id = NULL,
                updated_at = now()
            WHERE id = $3
            "#,
        )
        .bind(error_message)
        .bind(delay.as_secs_f64())
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            job_id = %job.job_id,
            attempt = job.attempt,
            delay_secs = delay.as_secs_f64(),
            "job re-scheduled after transient failure"
        );
        Ok(FailOutcome::Retried)
    }
}
