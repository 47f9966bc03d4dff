//! Job worker runtime.
//!
//! A long-running service that polls the queue, dispatches each claimed
//! job to its registered handler, and records the outcome. Within one
//! process up to `max_jobs` jobs run concurrently; each suspends on its
//! own I/O. Mutual exclusion per application is the handler's business
//! (distributed lock), not the runtime's.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::common::errors::{AppError, ErrorClass};

use super::queue::{FailOutcome, PostgresQueue};
use super::queue_job::QueueJob;

/// Executes one kind of job.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, job: &QueueJob) -> Result<(), AppError>;
}

/// Outcome hooks: keep the outbox row in step with the queue and feed the
/// dead-letter queue.
#[async_trait::async_trait]
pub trait JobLifecycleHooks: Send + Sync {
    async fn on_success(&self, job: &QueueJob);
    async fn on_dead_letter(&self, job: &QueueJob, error: &AppError);
}

/// Hooks that do nothing; used by tests.
pub struct NoopHooks;

#[async_trait::async_trait]
impl JobLifecycleHooks for NoopHooks {
    async fn on_success(&self, _job: &QueueJob) {}
    async fn on_dead_letter(&self, _job: &QueueJob, _error: &AppError) {}
}

#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// Maximum jobs claimed per poll.
    pub batch_size: i64,
    /// Jobs in flight concurrently within this process.
    pub max_jobs: usize,
    /// Poll interval when the last poll returned nothing.
    pub max_poll_interval: Duration,
    /// Poll interval while work is flowing.
    pub min_poll_interval: Duration,
    /// Lease granted on claim; also the heartbeat extension.
    pub lease_duration: Duration,
    /// Hard ceiling on a single job execution.
    pub job_timeout: Duration,
    pub worker_id: String,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        JobWorkerConfig {
            batch_size: 10,
            max_jobs: 10,
            max_poll_interval: Duration::from_secs(5),
            min_poll_interval: Duration::from_millis(100),
            lease_duration: Duration::from_secs(60),
            job_timeout: Duration::from_secs(300),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

pub struct JobWorker {
    queue: Arc<PostgresQueue>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    hooks: Arc<dyn JobLifecycleHooks>,
    config: JobWorkerConfig,
}

impl JobWorker {
    pub fn new(
        queue: Arc<PostgresQueue>,
        hooks: Arc<dyn JobLifecycleHooks>,
        config: JobWorkerConfig,
    ) -> Self {
        JobWorker {
            queue,
            handlers: HashMap::new(),
            hooks,
            config,
        }
    }

    pub fn register(mut self, task_name: &str, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(task_name.to_string(), handler);
        self
    }

    /// Poll-dispatch loop. Returns when `shutdown` fires; in-flight jobs
    /// finish first.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_jobs));
        tracing::info!(worker_id = %self.config.worker_id, "job worker started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let free_slots = semaphore.available_permits() as i64;
            let claimed = if free_slots == 0 {
                Vec::new()
            } else {
                match self
                    .queue
                    .claim_batch(
                        &self.config.worker_id,
                        free_slots.min(self.config.batch_size),
                        self.config.lease_duration,
                    )
                    .await
                {
                    Ok(jobs) => jobs,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to claim jobs");
                        Vec::new()
                    }
                }
            };

            let got_work = !claimed.is_empty();
            for job in claimed {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");
                let worker = self.clone();
                let job_shutdown = shutdown.child_token();
                tokio::spawn(async move {
                    worker.process_job(job, job_shutdown).await;
                    drop(permit);
                });
            }

            let interval = if got_work {
                self.config.min_poll_interval
            } else {
                self.config.max_poll_interval
            };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        // Drain: wait for in-flight jobs to release their permits.
        let _ = semaphore.acquire_many(self.config.max_jobs as u32).await;
        tracing::info!(worker_id = %self.config.worker_id, "job worker stopped");
    }

    async fn process_job(&self, job: QueueJob, _cancel: CancellationToken) {
        let Some(handler) = self.handlers.get(&job.task_name) else {
            tracing::error!(job_id = %job.job_id, task = %job.task_name, "no handler registered");
            let err = AppError::Validation(format!("unknown task: {}", job.task_name));
            if let Ok(FailOutcome::DeadLettered) =
                self.queue.mark_failed(&job, &err.to_string(), true).await
            {
                self.hooks.on_dead_letter(&job, &err).await;
            }
            return;
        };

        // Periodic lease extension while the job runs.
        let heartbeat = {
            let queue = self.queue.clone();
            let lease = self.config.lease_duration;
            let job = job.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(lease / 2);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = queue.heartbeat(&job, lease).await {
                        tracing::warn!(job_id = %job.job_id, error = %e, "heartbeat failed");
                    }
                }
            })
        };

        let result = match tokio::time::timeout(self.config.job_timeout, handler.execute(&job)).await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::NetworkTimeout(format!(
                "job did not finish within {:?}",
                self.config.job_timeout
            ))),
        };
        heartbeat.abort();

        match result {
            Ok(()) => {
                tracing::debug!(job_id = %job.job_id, "job succeeded");
                if let Err(e) = self.queue.mark_succeeded(&job).await {
                    tracing::error!(job_id = %job.job_id, error = %e, "failed to mark job succeeded");
                    return;
                }
                self.hooks.on_success(&job).await;
            }
            Err(err) => {
                let permanent = err.class() == ErrorClass::Permanent;
                tracing::warn!(
                    job_id = %job.job_id,
                    attempt = job.attempt,
                    permanent,
                    error = %err,
                    "job failed"
                );
                match self.queue.mark_failed(&job, &err.to_string(), permanent).await {
                    Ok(FailOutcome::DeadLettered) => {
                        self.hooks.on_dead_letter(&job, &err).await;
                    }
                    Ok(FailOutcome::Retried) => {}
                    Err(e) => {
                        tracing::error!(job_id = %job.job_id, error = %e, "failed to mark job failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_runtime_expectations() {
        let config = JobWorkerConfig::default();
        assert_eq!(config.max_jobs, 10);
        assert_eq!(config.batch_size, 10);
        assert!(config.min_poll_interval < config.max_poll_interval);
    }
}
