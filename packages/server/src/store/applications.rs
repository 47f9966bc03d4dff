//! Application model and queries.
//!
//! PII columns hold ciphertext; the digest column carries the
//! duplicate-document constraint. Rows are soft-deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgConnection;
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::errors::AppError;
use crate::common::pagination::PageParams;
use crate::common::types::{ApplicationStatus, Country};

const COLUMNS: &str = "id, country, full_name, identity_document, document_digest, \
     requested_amount, monthly_income, currency, idempotency_key, status, \
     country_specific_data, banking_data, validation_errors, risk_score, \
     rejection_reason, created_at, updated_at, deleted_at";

#[derive(Debug, Clone, FromRow)]
pub struct Application {
    pub id: Uuid,
    pub country: Country,
    /// Ciphertext. Decrypt through the kernel cipher; never persist the
    /// plaintext.
    pub full_name: Vec<u8>,
    /// Ciphertext.
    pub identity_document: Vec<u8>,
    pub document_digest: Vec<u8>,
    pub requested_amount: Decimal,
    pub monthly_income: Decimal,
    pub currency: String,
    pub idempotency_key: Option<String>,
    pub status: ApplicationStatus,
    pub country_specific_data: serde_json::Value,
    pub banking_data: serde_json::Value,
    pub validation_errors: serde_json::Value,
    pub risk_score: Option<Decimal>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Insert payload: everything the create path computes up front.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub country: Country,
    pub full_name_ciphertext: Vec<u8>,
    pub identity_document_ciphertext: Vec<u8>,
    pub document_digest: Vec<u8>,
    pub requested_amount: Decimal,
    pub monthly_income: Decimal,
    pub currency: String,
    pub idempotency_key: Option<String>,
    pub country_specific_data: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub country: Option<Country>,
    pub status: Option<ApplicationStatus>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CountryStats {
    pub country: Country,
    pub total: i64,
    pub by_status: std::collections::BTreeMap<String, i64>,
    pub total_requested_amount: String,
    pub average_requested_amount: Option<String>,
}

impl Application {
    /// Insert a new application. Unique violations come back tagged so the
    /// caller can answer 409 (document) or collapse to the existing row
    /// (idempotency key).
    pub async fn insert(conn: &mut PgConnection, new: &NewApplication) -> Result<Self, AppError> {
        let result = sqlx::query_as::<_, Self>(&format!(
            r#"
            INSERT INTO applications (
                country, full_name, identity_document, document_digest,
                requested_amount, monthly_income, currency, idempotency_key,
                country_specific_data
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(new.country)
        .bind(&new.full_name_ciphertext)
        .bind(&new.identity_document_ciphertext)
        .bind(&new.document_digest)
        .bind(new.requested_amount)
        .bind(new.monthly_income)
        .bind(&new.currency)
        .bind(&new.idempotency_key)
        .bind(&new.country_specific_data)
        .fetch_one(conn)
        .await;

        result.map_err(|e| tag_integrity_error(e, new.country))
    }

    pub async fn find_by_id<'e, E>(
        executor: E,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Self>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM applications WHERE id = $1{}",
            if include_deleted {
                ""
            } else {
                " AND deleted_at IS NULL"
            }
        );
        let found = sqlx::query_as::<_, Self>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(found)
    }

    /// Lock the row for the remainder of the transaction.
    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Self>, AppError> {
        let found = sqlx::query_as::<_, Self>(&format!(
            "SELECT {COLUMNS} FROM applications WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?;
        Ok(found)
    }

    pub async fn find_by_idempotency_key<'e, E>(
        executor: E,
        key: &str,
        for_update: bool,
    ) -> Result<Option<Self>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM applications WHERE idempotency_key = $1 AND deleted_at IS NULL{}",
            if for_update { " FOR UPDATE" } else { "" }
        );
        let found = sqlx::query_as::<_, Self>(&query)
            .bind(key)
            .fetch_optional(executor)
            .await?;
        Ok(found)
    }

    /// The active application holding the (country, document) slot, if any.
    pub async fn find_active_by_document<'e, E>(
        executor: E,
        country: Country,
        document_digest: &[u8],
        for_update: bool,
    ) -> Result<Option<Self>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let query = format!(
            r#"
            SELECT {COLUMNS} FROM applications
            WHERE country = $1
              AND document_digest = $2
              AND status NOT IN ('CANCELLED', 'REJECTED', 'COMPLETED')
              AND deleted_at IS NULL
            {}
            "#,
            if for_update { "FOR UPDATE" } else { "" }
        );
        let found = sqlx::query_as::<_, Self>(&query)
            .bind(country)
            .bind(document_digest)
            .fetch_optional(executor)
            .await?;
        Ok(found)
    }

    /// Worker write-back: evaluation results and the final status in one
    /// statement, so the audit trigger sees a single transition.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_evaluation(
        conn: &mut PgConnection,
        id: Uuid,
        banking_data: &serde_json::Value,
        risk_score: Decimal,
        country_specific_data: &serde_json::Value,
        validation_errors: &serde_json::Value,
        status: ApplicationStatus,
    ) -> Result<Self, AppError> {
        let updated = sqlx::query_as::<_, Self>(&format!(
            r#"
            UPDATE applications
            SET banking_data = $1,
                risk_score = $2,
                country_specific_data = $3,
                validation_errors = $4,
                status = $5,
                updated_at = now()
            WHERE id = $6
            RETURNING {COLUMNS}
            "#
        ))
        .bind(banking_data)
        .bind(risk_score)
        .bind(country_specific_data)
        .bind(validation_errors)
        .bind(status)
        .bind(id)
        .fetch_one(conn)
        .await?;
        Ok(updated)
    }

    pub async fn update_status(
        conn: &mut PgConnection,
        id: Uuid,
        status: ApplicationStatus,
    ) -> Result<Self, AppError> {
        let updated = sqlx::query_as::<_, Self>(&format!(
            r#"
            UPDATE applications
            SET status = $1, updated_at = now()
            WHERE id = $2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(status)
        .bind(id)
        .fetch_one(conn)
        .await?;
        Ok(updated)
    }

    /// Admin update: status and/or risk score and/or merged banking data.
    pub async fn apply_admin_update(
        conn: &mut PgConnection,
        id: Uuid,
        status: Option<ApplicationStatus>,
        risk_score: Option<Decimal>,
        banking_data: Option<&serde_json::Value>,
        rejection_reason: Option<&str>,
    ) -> Result<Self, AppError> {
        let updated = sqlx::query_as::<_, Self>(&format!(
            r#"
            UPDATE applications
            SET status = COALESCE($1, status),
                risk_score = COALESCE($2, risk_score),
                banking_data = CASE WHEN $3::jsonb IS NULL THEN banking_data
                                    ELSE banking_data || $3::jsonb END,
                rejection_reason = COALESCE($4, rejection_reason),
                updated_at = now()
            WHERE id = $5
            RETURNING {COLUMNS}
            "#
        ))
        .bind(status)
        .bind(risk_score)
        .bind(banking_data)
        .bind(rejection_reason)
        .bind(id)
        .fetch_one(conn)
        .await?;
        Ok(updated)
    }

    /// Webhook write-back: merge confirmation into banking_data, optionally
    /// forcing a status and appending validation errors.
    pub async fn apply_bank_confirmation(
        conn: &mut PgConnection,
        id: Uuid,
        banking_data_patch: &serde_json::Value,
        new_status: Option<ApplicationStatus>,
        appended_errors: &[String],
    ) -> Result<Self, AppError> {
        let updated = sqlx::query_as::<_, Self>(&format!(
            r#"
            UPDATE applications
            SET banking_data = banking_data || $1::jsonb,
                status = COALESCE($2, status),
                validation_errors = validation_errors || $3::jsonb,
                updated_at = now()
            WHERE id = $4
            RETURNING {COLUMNS}
            "#
        ))
        .bind(banking_data_patch)
        .bind(new_status)
        .bind(serde_json::json!(appended_errors))
        .bind(id)
        .fetch_one(conn)
        .await?;
        Ok(updated)
    }

    pub async fn soft_delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, AppError> {
        let rows = sqlx::query(
            "UPDATE applications SET deleted_at = now(), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(conn)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    pub async fn list<'e, E>(
        executor: E,
        filters: &ListFilters,
        params: &PageParams,
    ) -> Result<Vec<Self>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query_as::<_, Self>(&format!(
            r#"
            SELECT {COLUMNS} FROM applications
            WHERE deleted_at IS NULL
              AND ($1::country_code IS NULL OR country = $1)
              AND ($2::application_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(filters.country)
        .bind(filters.status)
        .bind(params.page_size())
        .bind(params.offset())
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    pub async fn count<'e, E>(executor: E, filters: &ListFilters) -> Result<i64, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT count(*) FROM applications
            WHERE deleted_at IS NULL
              AND ($1::country_code IS NULL OR country = $1)
              AND ($2::application_status IS NULL OR status = $2)
            "#,
        )
        .bind(filters.country)
        .bind(filters.status)
        .fetch_one(executor)
        .await?;
        Ok(count)
    }

    /// Counts and sums over non-deleted rows for one country.
    pub async fn statistics_by_country<'e, E>(
        executor: E,
        country: Country,
    ) -> Result<CountryStats, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows: Vec<(ApplicationStatus, i64, Decimal)> = sqlx::query_as(
            r#"
            SELECT status, count(*), COALESCE(sum(requested_amount), 0)
            FROM applications
            WHERE country = $1 AND deleted_at IS NULL
            GROUP BY status
            "#,
        )
        .bind(country)
        .fetch_all(executor)
        .await?;

        let mut by_status = std::collections::BTreeMap::new();
        let mut total = 0i64;
        let mut total_amount = Decimal::ZERO;
        for (status, count, amount) in rows {
            by_status.insert(status.as_str().to_string(), count);
            total += count;
            total_amount += amount;
        }

        let average = if total > 0 {
            Some(crate::common::decimal::decimal_to_string(
                total_amount / Decimal::from(total),
            ))
        } else {
            None
        };

        Ok(CountryStats {
            country,
            total,
            by_status,
            total_requested_amount: crate::common::decimal::decimal_to_string(total_amount),
            average_requested_amount: average,
        })
    }

    /// The ordered list of validation error strings.
    pub fn validation_errors_vec(&self) -> Vec<String> {
        self.validation_errors
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Translate unique violations into the tagged duplicate errors.
fn tag_integrity_error(err: sqlx::Error, country: Country) -> AppError {
    if let sqlx::Error::Database(ref dbe) = err {
        if dbe.code().as_deref() == Some("23505") {
            return match dbe.constraint() {
                Some("uq_applications_active_document") => AppError::DuplicateDocument(format!(
                    "an active application already exists for this document in {country}"
                )),
                Some("uq_applications_idempotency_key") => {
                    AppError::DuplicateIdempotencyKey("idempotency key already used".to_string())
                }
                _ => AppError::Database(err),
            };
        }
    }
    AppError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_vec_reads_ordered_strings() {
        let app = sample_app(serde_json::json!(["first", "second"]));
        assert_eq!(app.validation_errors_vec(), vec!["first", "second"]);
    }

    #[test]
    fn validation_errors_vec_tolerates_non_arrays() {
        let app = sample_app(serde_json::json!({"not": "a list"}));
        assert!(app.validation_errors_vec().is_empty());
    }

    fn sample_app(validation_errors: serde_json::Value) -> Application {
        Application {
            id: Uuid::new_v4(),
            country: Country::ES,
            full_name: vec![1, 2, 3],
            identity_document: vec![4, 5, 6],
            document_digest: vec![7; 32],
            requested_amount: Decimal::from(10_000),
            monthly_income: Decimal::from(3_000),
            currency: "EUR".into(),
            idempotency_key: None,
            status: ApplicationStatus::Pending,
            country_specific_data: serde_json::json!({}),
            banking_data: serde_json::json!({}),
            validation_errors,
            risk_score: None,
            rejection_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }
}
