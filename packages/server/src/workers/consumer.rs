//! Outbox consumer: lifts `pending_jobs` rows into the work queue.
//!
//! The insert trigger writes the outbox row; this consumer offers it to
//! the queue under the `rt_{application_id}` job id. The realtime path
//! races with it on purpose — the queue's duplicate suppression makes
//! both safe, and the `status = 'PENDING'` predicate keeps each row from
//! being lifted twice.

use uuid::Uuid;

use crate::common::errors::AppError;
use crate::kernel::jobs::{realtime_job_id, EnqueueOutcome};
use crate::kernel::AppKernel;
use crate::store::PendingJob;

const BATCH_SIZE: i64 = 50;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub scanned: usize,
    pub enqueued: usize,
    pub failed: usize,
}

/// One consumer pass: scan up to 50 PENDING rows oldest-first and offer
/// each to the queue. Per-row failures are recorded on the row and do not
/// stop the pass.
pub async fn consume_pending_jobs(kernel: &AppKernel) -> Result<ConsumerReport, AppError> {
    let pending = PendingJob::find_pending(&kernel.db_pool, BATCH_SIZE).await?;

    let mut report = ConsumerReport {
        scanned: pending.len(),
        ..Default::default()
    };

    if pending.is_empty() {
        tracing::debug!("no pending outbox rows");
        return Ok(report);
    }

    tracing::info!(count = pending.len(), "consuming pending outbox rows");

    for row in pending {
        match lift_row(kernel, &row).await {
            Ok(()) => report.enqueued += 1,
            Err(e) => {
                report.failed += 1;
                tracing::error!(
                    pending_job_id = %row.id,
                    application_id = %row.application_id,
                    error = %e,
                    "failed to enqueue outbox row"
                );
                if let Err(mark_err) =
                    PendingJob::mark_failed(&kernel.db_pool, row.id, &e.to_string()).await
                {
                    tracing::error!(
                        pending_job_id = %row.id,
                        error = %mark_err,
                        "failed to record outbox enqueue failure"
                    );
                }
            }
        }
    }

    tracing::info!(
        scanned = report.scanned,
        enqueued = report.enqueued,
        failed = report.failed,
        "outbox consumer pass complete"
    );
    Ok(report)
}

async fn lift_row(kernel: &AppKernel, row: &PendingJob) -> Result<(), AppError> {
    let application_id = application_id_of(row);
    let job_id = realtime_job_id(application_id);

    let outcome = kernel
        .queue
        .enqueue(
            &job_id,
            &row.task_name,
            serde_json::json!({ "application_id": application_id }),
        )
        .await?;

    if matches!(outcome, EnqueueOutcome::Duplicate) {
        tracing::debug!(
            pending_job_id = %row.id,
            %job_id,
            "queue already holds this job (realtime path won)"
        );
    }

    // Conditional on PENDING: a racing consumer pass loses here, not at
    // the queue.
    let transitioned =
        PendingJob::mark_enqueued(&kernel.db_pool, row.id, &job_id).await?;
    if !transitioned {
        tracing::debug!(pending_job_id = %row.id, "outbox row already claimed");
    }
    Ok(())
}

/// The application id from job_args, falling back to the column.
fn application_id_of(row: &PendingJob) -> Uuid {
    row.job_args
        .get("application_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or(row.application_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PendingJobStatus;
    use chrono::Utc;

    #[test]
    fn application_id_prefers_job_args() {
        let args_id = Uuid::new_v4();
        let column_id = Uuid::new_v4();
        let row = sample_row(
            column_id,
            serde_json::json!({"application_id": args_id.to_string()}),
        );
        assert_eq!(application_id_of(&row), args_id);
    }

    #[test]
    fn application_id_falls_back_to_the_column() {
        let column_id = Uuid::new_v4();
        let row = sample_row(column_id, serde_json::json!({}));
        assert_eq!(application_id_of(&row), column_id);
    }

    fn sample_row(application_id: Uuid, job_args: serde_json::Value) -> PendingJob {
        PendingJob {
            id: Uuid::new_v4(),
            application_id,
            task_name: "process_credit_application".into(),
            job_args,
            job_kwargs: serde_json::json!({}),
            status: PendingJobStatus::Pending,
            queue_job_id: None,
            error_message: None,
            retry_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            enqueued_at: None,
            processed_at: None,
        }
    }
}
