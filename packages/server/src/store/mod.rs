//! Durable store: models and their SQL.
//!
//! Each model carries its own queries, written against explicit executors
//! so callers decide the transaction scope. Integrity violations surface
//! as tagged errors (duplicate document / duplicate idempotency key) for
//! the create path to translate.

pub mod applications;
pub mod audit_logs;
pub mod failed_jobs;
pub mod pending_jobs;
pub mod webhook_events;

pub use applications::{Application, CountryStats, ListFilters, NewApplication};
pub use audit_logs::AuditLog;
pub use failed_jobs::{FailedJob, FailedJobStatus, NewFailedJob};
pub use pending_jobs::{PendingJob, PendingJobStatus};
pub use webhook_events::{WebhookEvent, WebhookEventStatus};
