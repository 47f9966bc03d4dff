//! Cron wiring for the worker process.
//!
//! - outbox consumer: every minute (fallback for the realtime path)
//! - DLQ retry scheduler: every 15 minutes
//! - webhook-event retention sweep: daily at 03:10 UTC

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::kernel::AppKernel;

use super::{cleanup_webhook_events, consume_pending_jobs, retry_failed_jobs};

pub async fn start_scheduler(kernel: AppKernel) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let consumer_kernel = kernel.clone();
    let consumer_job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let kernel = consumer_kernel.clone();
        Box::pin(async move {
            if let Err(e) = consume_pending_jobs(&kernel).await {
                tracing::error!(error = %e, "outbox consumer pass failed");
            }
        })
    })?;
    scheduler.add(consumer_job).await?;

    let retry_kernel = kernel.clone();
    let retry_job = Job::new_async("0 */15 * * * *", move |_uuid, _lock| {
        let kernel = retry_kernel.clone();
        Box::pin(async move {
            if let Err(e) = retry_failed_jobs(&kernel).await {
                tracing::error!(error = %e, "retry scheduler pass failed");
            }
        })
    })?;
    scheduler.add(retry_job).await?;

    let cleanup_kernel = kernel.clone();
    let cleanup_job = Job::new_async("0 10 3 * * *", move |_uuid, _lock| {
        let kernel = cleanup_kernel.clone();
        Box::pin(async move {
            if let Err(e) = cleanup_webhook_events(&kernel).await {
                tracing::error!(error = %e, "webhook cleanup pass failed");
            }
        })
    })?;
    scheduler.add(cleanup_job).await?;

    scheduler.start().await?;
    tracing::info!(
        "scheduled tasks started (outbox consumer every minute, DLQ retry every 15 minutes, webhook cleanup daily)"
    );
    Ok(scheduler)
}
