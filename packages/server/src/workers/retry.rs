//! DLQ retry scheduler.
//!
//! Re-enqueues retryable dead-lettered jobs under a fresh
//! `{original}_retry_{epoch}` id. The new job runs the normal pipeline;
//! whether the provider has actually recovered is the circuit breaker's
//! call, not ours.

use chrono::Utc;

use crate::common::errors::AppError;
use crate::kernel::jobs::{retry_job_id, EnqueueOutcome};
use crate::kernel::AppKernel;
use crate::store::FailedJob;

const BATCH_SIZE: i64 = 100;

/// Error types eligible for re-enqueue. Everything else stays parked for
/// manual review even if flagged retryable.
const RETRYABLE_ERROR_TYPES: [&str; 3] = [
    "ProviderUnavailableError",
    "NetworkTimeoutError",
    "ExternalServiceError",
];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub checked: usize,
    pub retried: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// One scheduler pass over the DLQ, oldest first.
pub async fn retry_failed_jobs(kernel: &AppKernel) -> Result<RetryReport, AppError> {
    let candidates = FailedJob::find_retryable(&kernel.db_pool, BATCH_SIZE).await?;

    let mut report = RetryReport {
        checked: candidates.len(),
        ..Default::default()
    };

    if candidates.is_empty() {
        tracing::debug!("no retryable jobs in the dead letter queue");
        return Ok(report);
    }

    tracing::info!(count = candidates.len(), "retrying dead-lettered jobs");

    for failed_job in candidates {
        if !is_retryable_error_type(&failed_job.error_type) {
            report.skipped += 1;
            tracing::debug!(
                queue_job_id = %failed_job.queue_job_id,
                error_type = %failed_job.error_type,
                "error type not eligible for automatic retry"
            );
            continue;
        }

        match re_enqueue(kernel, &failed_job).await {
            Ok(()) => report.retried += 1,
            Err(e) => {
                report.failed += 1;
                tracing::error!(
                    queue_job_id = %failed_job.queue_job_id,
                    error = %e,
                    "failed to re-enqueue dead-lettered job"
                );
            }
        }
    }

    tracing::info!(
        checked = report.checked,
        retried = report.retried,
        skipped = report.skipped,
        failed = report.failed,
        "retry scheduler pass complete"
    );
    Ok(report)
}

fn is_retryable_error_type(error_type: &str) -> bool {
    RETRYABLE_ERROR_TYPES.contains(&error_type)
}

async fn re_enqueue(kernel: &AppKernel, failed_job: &FailedJob) -> Result<(), AppError> {
    let new_job_id = retry_job_id(&failed_job.queue_job_id, Utc::now().timestamp());

    let outcome = kernel
        .queue
        .enqueue(&new_job_id, &failed_job.task_name, failed_job.job_args.clone())
        .await?;
    if matches!(outcome, EnqueueOutcome::Duplicate) {
        tracing::warn!(%new_job_id, "retry job id already queued");
    }

    FailedJob::mark_retried(&kernel.db_pool, failed_job.id, &new_job_id).await?;

    tracing::info!(
        original = %failed_job.queue_job_id,
        retry = %new_job_id,
        error_type = %failed_job.error_type,
        "dead-lettered job re-enqueued"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_provider_shaped_errors_are_eligible() {
        assert!(is_retryable_error_type("ProviderUnavailableError"));
        assert!(is_retryable_error_type("NetworkTimeoutError"));
        assert!(is_retryable_error_type("ExternalServiceError"));
        assert!(!is_retryable_error_type("ValidationError"));
        assert!(!is_retryable_error_type("StateTransitionError"));
        assert!(!is_retryable_error_type("InternalError"));
    }
}
