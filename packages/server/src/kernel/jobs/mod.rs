//! Job infrastructure for background processing.
//!
//! - [`PostgresQueue`] - database-backed work queue with native duplicate
//!   suppression on `job_id`
//! - [`JobWorker`] - long-running service that claims and executes jobs
//! - [`QueueJob`] - job model
//!
//! # Architecture
//!
//! ```text
//! API (realtime path) ──► queue.enqueue("rt_{app_id}")
//! Outbox consumer     ──► queue.enqueue("rt_{app_id}")   (only one wins)
//!
//! JobWorker
//!     ├─► claim batch (FOR UPDATE SKIP LOCKED + lease)
//!     ├─► dispatch to the registered JobHandler
//!     └─► mark succeeded / retry with backoff / dead-letter
//! ```

mod backoff;
mod queue;
mod queue_job;
mod worker;

pub use backoff::Backoff;
pub use queue::{EnqueueOutcome, FailOutcome, PostgresQueue};
pub use queue_job::{QueueJob, QueueJobStatus};
pub use worker::{JobHandler, JobLifecycleHooks, JobWorker, JobWorkerConfig, NoopHooks};

use uuid::Uuid;

/// Task name for the evaluation pipeline.
pub const PROCESS_CREDIT_APPLICATION: &str = "process_credit_application";

/// Queue job id for an application's evaluation. Both enqueue paths use
/// this id, so the queue's duplicate detection collapses them.
pub fn realtime_job_id(application_id: Uuid) -> String {
    format!("rt_{application_id}")
}

/// Queue job id for a DLQ re-enqueue.
pub fn retry_job_id(original_job_id: &str, epoch_seconds: i64) -> String {
    format!("{original_job_id}_retry_{epoch_seconds}")
}
