//! Queue job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "queue_job_status", rename_all = "snake_case")]
pub enum QueueJobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    DeadLetter,
}

#[derive(Debug, Clone, FromRow)]
pub struct QueueJob {
    pub id: Uuid,
    /// Caller-supplied identity; UNIQUE, the duplicate-suppression key.
    pub job_id: String,
    pub task_name: String,
    pub args: serde_json::Value,
    pub status: QueueJobStatus,
    /// Number of executions so far (incremented at claim time).
    pub attempt: i32,
    pub max_tries: i32,
    pub next_run_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueJob {
    /// The application this job evaluates, when present in args.
    pub fn application_id(&self) -> Option<Uuid> {
        self.args
            .get("application_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_tries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(attempt: i32, max_tries: i32) -> QueueJob {
        QueueJob {
            id: Uuid::new_v4(),
            job_id: "rt_test".into(),
            task_name: "process_credit_application".into(),
            args: json!({"application_id": "7f8d1a30-0f3e-4e7e-9f46-0d9f6f3d2b11"}),
            status: QueueJobStatus::Running,
            attempt,
            max_tries,
            next_run_at: Utc::now(),
            lease_expires_at: None,
            worker_id: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn application_id_parses_from_args() {
        assert!(job(1, 3).application_id().is_some());
    }

    #[test]
    fn application_id_absent_for_malformed_args() {
        let mut j = job(1, 3);
        j.args = json!({"application_id": "not-a-uuid"});
        assert!(j.application_id().is_none());
        j.args = json!({});
        assert!(j.application_id().is_none());
    }

    #[test]
    fn final_attempt_compares_against_max_tries() {
        assert!(!job(2, 3).is_final_attempt());
        assert!(job(3, 3).is_final_attempt());
    }
}
