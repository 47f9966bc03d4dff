//! Webhook event model (`webhook_events`).
//!
//! One row per `provider_reference`; the unique key makes webhook replay
//! idempotent. Rows older than the retention window are purged by the
//! cleanup job.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::errors::AppError;

/// Retention window for processed events.
pub const RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[sqlx(type_name = "webhook_event_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookEventStatus {
    Processing,
    Processed,
    Failed,
}

#[derive(Debug, Clone, FromRow)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub idempotency_key: String,
    pub application_id: Uuid,
    pub payload: serde_json::Value,
    pub status: WebhookEventStatus,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

const COLUMNS: &str =
    "id, idempotency_key, application_id, payload, status, error_message, processed_at, created_at";

impl WebhookEvent {
    pub fn is_already_processed(&self) -> bool {
        self.status == WebhookEventStatus::Processed
    }

    pub async fn find_by_idempotency_key<'e, E>(
        executor: E,
        key: &str,
    ) -> Result<Option<Self>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM webhook_events WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    /// Insert a PROCESSING row. A unique violation means a concurrent
    /// delivery won the race; the caller re-reads and acts on that row.
    pub async fn insert_processing(
        conn: &mut PgConnection,
        idempotency_key: &str,
        application_id: Uuid,
        payload: &serde_json::Value,
    ) -> Result<Option<Self>, AppError> {
        let result = sqlx::query_as::<_, Self>(&format!(
            r#"
            INSERT INTO webhook_events (idempotency_key, application_id, payload, status)
            VALUES ($1, $2, $3, 'PROCESSING')
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(idempotency_key)
        .bind(application_id)
        .bind(payload)
        .fetch_optional(conn)
        .await?;
        Ok(result)
    }

    /// Reset a FAILED (or stuck PROCESSING) row for another attempt.
    pub async fn reset_for_retry(conn: &mut PgConnection, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE webhook_events SET status = 'PROCESSING', error_message = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn mark_processed(conn: &mut PgConnection, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE webhook_events SET status = 'PROCESSED', processed_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn mark_failed<'e, E>(executor: E, id: Uuid, error: &str) -> Result<(), AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query("UPDATE webhook_events SET status = 'FAILED', error_message = $1 WHERE id = $2")
            .bind(error)
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Delete events older than the retention window. Returns rows purged.
    pub async fn purge_older_than_retention<'e, E>(executor: E) -> Result<u64, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query(
            "DELETE FROM webhook_events WHERE created_at < now() - make_interval(days => $1)",
        )
        .bind(RETENTION_DAYS as i32)
        .execute(executor)
        .await?
        .rows_affected();
        Ok(rows)
    }
}
