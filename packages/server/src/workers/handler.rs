//! The `process_credit_application` job handler and lifecycle hooks.
//!
//! The handler owns the per-application distributed lock: an application
//! may be offered twice (realtime + outbox) and retried besides, so only
//! the lock holder may advance state. Lock contention is a transient
//! failure; the queue retries it.

use std::sync::Arc;

use crate::common::errors::AppError;
use crate::kernel::jobs::{JobHandler, JobLifecycleHooks, QueueJob};
use crate::kernel::locks::{process_lock_key, PROCESS_LOCK_TTL};
use crate::kernel::AppKernel;
use crate::providers::BankingProvider;
use crate::services::{FailedJobService, ProcessingService};
use crate::store::PendingJob;

pub struct ProcessCreditApplicationHandler {
    kernel: AppKernel,
    processing: ProcessingService,
}

impl ProcessCreditApplicationHandler {
    pub fn new(kernel: AppKernel) -> Self {
        let processing = ProcessingService::new(kernel.clone());
        ProcessCreditApplicationHandler { kernel, processing }
    }

    pub fn with_provider(kernel: AppKernel, provider: Arc<dyn BankingProvider>) -> Self {
        let processing = ProcessingService::with_provider(kernel.clone(), provider);
        ProcessCreditApplicationHandler { kernel, processing }
    }
}

#[async_trait::async_trait]
impl JobHandler for ProcessCreditApplicationHandler {
    async fn execute(&self, job: &QueueJob) -> Result<(), AppError> {
        let application_id = job.application_id().ok_or_else(|| {
            AppError::InvalidApplicationId(format!("job {} carries no valid application_id", job.job_id))
        })?;

        let lock_key = process_lock_key(application_id);
        if !self.kernel.locks.acquire(&lock_key, PROCESS_LOCK_TTL).await? {
            return Err(AppError::Recoverable(format!(
                "application {application_id} is locked by another worker"
            )));
        }

        if let Err(e) =
            PendingJob::mark_processing_by_queue_job_id(&self.kernel.db_pool, &job.job_id).await
        {
            tracing::warn!(job_id = %job.job_id, error = %e, "failed to mark outbox row processing");
        }

        let result = self.processing.process_application(application_id).await;

        if let Err(e) = self.kernel.locks.release(&lock_key).await {
            tracing::warn!(%application_id, error = %e, "failed to release process lock");
        }

        result.map(|summary| {
            tracing::info!(job_id = %job.job_id, %summary, "evaluation finished");
        })
    }
}

/// Keeps the outbox row in step with the queue and writes the DLQ.
pub struct PipelineHooks {
    kernel: AppKernel,
    failed_jobs: FailedJobService,
}

impl PipelineHooks {
    pub fn new(kernel: AppKernel) -> Self {
        let failed_jobs = FailedJobService::new(kernel.clone());
        PipelineHooks {
            kernel,
            failed_jobs,
        }
    }
}

#[async_trait::async_trait]
impl JobLifecycleHooks for PipelineHooks {
    async fn on_success(&self, job: &QueueJob) {
        match PendingJob::mark_completed_by_queue_job_id(&self.kernel.db_pool, &job.job_id).await {
            Ok(true) => {
                tracing::debug!(job_id = %job.job_id, "outbox row completed");
            }
            Ok(false) => {
                tracing::warn!(job_id = %job.job_id, "no outbox row to complete");
            }
            Err(e) => {
                tracing::error!(job_id = %job.job_id, error = %e, "failed to complete outbox row");
            }
        }
    }

    async fn on_dead_letter(&self, job: &QueueJob, error: &AppError) {
        self.failed_jobs.record_dead_letter(job, error).await;
    }
}
