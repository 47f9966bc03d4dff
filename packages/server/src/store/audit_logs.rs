//! Audit log model and queries.
//!
//! Rows are written by the store-side trigger on status changes; this
//! module only reads them.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::errors::AppError;
use crate::common::pagination::PageParams;
use crate::common::types::ApplicationStatus;

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub application_id: Uuid,
    pub old_status: Option<ApplicationStatus>,
    pub new_status: ApplicationStatus,
    pub changed_by: String,
    pub change_reason: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    /// Page of audit rows for an application, newest first.
    pub async fn page_for_application<'e, E>(
        executor: E,
        application_id: Uuid,
        params: &PageParams,
    ) -> Result<Vec<Self>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, application_id, old_status, new_status, changed_by,
                   change_reason, metadata, created_at
            FROM audit_logs
            WHERE application_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(application_id)
        .bind(params.page_size())
        .bind(params.offset())
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    pub async fn count_for_application<'e, E>(
        executor: E,
        application_id: Uuid,
    ) -> Result<i64, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let count: i64 =
            sqlx::query_scalar("SELECT count(*) FROM audit_logs WHERE application_id = $1")
                .bind(application_id)
                .fetch_one(executor)
                .await?;
        Ok(count)
    }
}
