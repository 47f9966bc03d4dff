//! Application services: intake commands, reads, the evaluation pipeline
//! and dead-letter bookkeeping.

pub mod command;
pub mod failed_jobs;
pub mod processing;
pub mod query;

pub use command::{ApplicationCreate, ApplicationUpdate, CommandService, CreateOutcome};
pub use failed_jobs::FailedJobService;
pub use processing::ProcessingService;
pub use query::{DecryptedApplication, QueryService};
