//! Dead-letter bookkeeping.
//!
//! When a queue job exhausts its retries (or fails permanently), the
//! matching outbox row is marked FAILED and a `failed_jobs` row captures
//! the full error context. `is_retryable` comes from the error class, so
//! the retry scheduler only ever touches provider-shaped failures.

use crate::common::errors::AppError;
use crate::kernel::jobs::QueueJob;
use crate::kernel::AppKernel;
use crate::store::{FailedJob, NewFailedJob, PendingJob};

#[derive(Clone)]
pub struct FailedJobService {
    kernel: AppKernel,
}

impl FailedJobService {
    pub fn new(kernel: AppKernel) -> Self {
        FailedJobService { kernel }
    }

    /// Record a dead-lettered queue job. Never fails the caller: DLQ
    /// write problems are logged and swallowed so the worker loop
    /// survives.
    pub async fn record_dead_letter(&self, job: &QueueJob, error: &AppError) {
        if let Err(e) = self.try_record(job, error).await {
            tracing::error!(
                job_id = %job.job_id,
                error = %e,
                "failed to store job in dead letter queue"
            );
        }
    }

    async fn try_record(&self, job: &QueueJob, error: &AppError) -> Result<(), AppError> {
        let pending_job_id = match PendingJob::mark_failed_by_queue_job_id(
            &self.kernel.db_pool,
            &job.job_id,
            &error.to_string(),
        )
        .await
        {
            Ok(id) => {
                if id.is_none() {
                    tracing::warn!(job_id = %job.job_id, "no outbox row found for failed job");
                }
                id
            }
            Err(e) => {
                tracing::error!(job_id = %job.job_id, error = %e, "failed to mark outbox row");
                None
            }
        };

        let new = NewFailedJob {
            pending_job_id,
            queue_job_id: job.job_id.clone(),
            task_name: job.task_name.clone(),
            job_args: job.args.clone(),
            job_kwargs: serde_json::json!({}),
            error_type: error.error_type().to_string(),
            error_message: error.to_string(),
            error_traceback: Some(format!("{error:?}")),
            retry_count: job.attempt,
            max_retries: job.max_tries,
            is_retryable: error.is_retryable(),
            metadata: serde_json::json!({
                "worker_id": job.worker_id,
                "application_id": job.application_id(),
            }),
        };

        let stored = FailedJob::insert(&self.kernel.db_pool, &new).await?;
        tracing::info!(
            job_id = %job.job_id,
            failed_job_id = %stored.id,
            error_type = %new.error_type,
            is_retryable = new.is_retryable,
            "job stored in dead letter queue"
        );
        Ok(())
    }
}
