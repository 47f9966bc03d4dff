//! Write-side service: create, admin update, soft delete.
//!
//! Create fails fast: country, currency, document format and amount checks
//! run before any database work. Then, inside one transaction: idempotency
//! lookup (collapsing duplicates into the existing record), active-document
//! check, PII encryption and insert. The outbox row appears via the insert
//! trigger in the same transaction; the realtime enqueue runs after commit.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::common::decimal::validate_risk_score;
use crate::common::errors::AppError;
use crate::common::types::{ApplicationStatus, Country};
use crate::domain::country::strategy_for_code;
use crate::domain::state_machine::{is_final_state, validate_transition};
use crate::kernel::cache::country_stats_key;
use crate::kernel::jobs::{realtime_job_id, EnqueueOutcome, PROCESS_CREDIT_APPLICATION};
use crate::kernel::AppKernel;
use crate::realtime::publish_application_update;
use crate::store::{Application, NewApplication, PendingJob};

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationCreate {
    pub country: String,
    pub full_name: String,
    pub identity_document: String,
    pub requested_amount: Decimal,
    pub monthly_income: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub country_specific_data: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationUpdate {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub risk_score: Option<Decimal>,
    #[serde(default)]
    pub banking_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

#[derive(Debug)]
pub struct CreateOutcome {
    pub application: Application,
    /// False when an idempotency key collapsed this request into an
    /// existing record.
    pub created: bool,
}

#[derive(Clone)]
pub struct CommandService {
    kernel: AppKernel,
}

impl CommandService {
    pub fn new(kernel: AppKernel) -> Self {
        CommandService { kernel }
    }

    pub async fn create_application(
        &self,
        input: ApplicationCreate,
    ) -> Result<CreateOutcome, AppError> {
        tracing::info!(
            country = %input.country,
            amount = %input.requested_amount,
            "creating application"
        );

        // Fast validations, no database work.
        let strategy = strategy_for_code(&input.country, None)?;
        let country = strategy.country();
        let currency = normalize_currency(country, input.currency.as_deref())?;

        let validation = strategy.validate_identity_document(&input.identity_document);
        if !validation.is_valid {
            tracing::warn!(country = %country, errors = ?validation.errors, "document validation failed");
            return Err(AppError::Validation(format!(
                "Invalid identity document: {}",
                validation.errors.join(", ")
            )));
        }

        if input.requested_amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Requested amount must be positive".into(),
            ));
        }
        if input.monthly_income < Decimal::ZERO {
            return Err(AppError::Validation(
                "Monthly income cannot be negative".into(),
            ));
        }

        let digest = self
            .kernel
            .document_digest
            .compute(country, &input.identity_document);

        let mut tx = self.kernel.db_pool.begin().await?;

        // Idempotency: a replayed create returns the original record.
        if let Some(key) = input.idempotency_key.as_deref() {
            if let Some(existing) =
                Application::find_by_idempotency_key(&mut *tx, key, true).await?
            {
                tx.rollback().await?;
                tracing::info!(application_id = %existing.id, "idempotency key hit, returning existing");
                return Ok(CreateOutcome {
                    application: existing,
                    created: false,
                });
            }
        }

        // Duplicate-by-document pre-check for a useful error message. The
        // partial unique index is the actual guarantee under races.
        if let Some(existing) =
            Application::find_active_by_document(&mut *tx, country, &digest, true).await?
        {
            tx.rollback().await?;
            return Err(AppError::DuplicateDocument(format!(
                "an active application already exists for this document in {country} (id {})",
                existing.id
            )));
        }

        let full_name_ciphertext = self
            .kernel
            .cipher
            .encrypt(&mut *tx, &input.full_name)
            .await?;
        let identity_document_ciphertext = self
            .kernel
            .cipher
            .encrypt(&mut *tx, &input.identity_document)
            .await?;

        let new = NewApplication {
            country,
            full_name_ciphertext,
            identity_document_ciphertext,
            document_digest: digest,
            requested_amount: input.requested_amount,
            monthly_income: input.monthly_income,
            currency,
            idempotency_key: input.idempotency_key.clone(),
            country_specific_data: Value::Object(input.country_specific_data.unwrap_or_default()),
        };

        let inserted = Application::insert(&mut tx, &new).await;
        let application = match inserted {
            Ok(app) => app,
            Err(AppError::DuplicateIdempotencyKey(_)) => {
                // Raced on the key: the winner's row is the answer.
                tx.rollback().await?;
                let key = input.idempotency_key.as_deref().unwrap_or_default();
                let existing =
                    Application::find_by_idempotency_key(&self.kernel.db_pool, key, false)
                        .await?
                        .ok_or_else(|| {
                            AppError::Internal(anyhow::anyhow!(
                                "idempotency key collision without a surviving row"
                            ))
                        })?;
                return Ok(CreateOutcome {
                    application: existing,
                    created: false,
                });
            }
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };

        tx.commit().await?;
        tracing::info!(application_id = %application.id, "application created");

        self.kernel
            .cache
            .invalidate(&country_stats_key(country))
            .await;

        // Realtime path: offer the evaluation job now; the outbox consumer
        // is the fallback if this enqueue fails.
        self.enqueue_realtime(&application).await;

        Ok(CreateOutcome {
            application,
            created: true,
        })
    }

    async fn enqueue_realtime(&self, application: &Application) {
        let job_id = realtime_job_id(application.id);
        let args = serde_json::json!({ "application_id": application.id });

        match self
            .kernel
            .queue
            .enqueue(&job_id, PROCESS_CREDIT_APPLICATION, args)
            .await
        {
            Ok(EnqueueOutcome::Enqueued(_)) | Ok(EnqueueOutcome::Duplicate) => {
                if let Err(e) = PendingJob::mark_enqueued_for_application(
                    &self.kernel.db_pool,
                    application.id,
                    &job_id,
                )
                .await
                {
                    tracing::warn!(application_id = %application.id, error = %e,
                        "realtime enqueue succeeded but outbox row update failed");
                }
            }
            Err(e) => {
                tracing::warn!(
                    application_id = %application.id,
                    error = %e,
                    "realtime enqueue failed; outbox consumer will catch up"
                );
            }
        }
    }

    /// Admin partial update. Status changes go through the state machine
    /// and are audited as 'admin'.
    pub async fn update_application(
        &self,
        id: Uuid,
        update: ApplicationUpdate,
    ) -> Result<Application, AppError> {
        let new_status = update
            .status
            .as_deref()
            .map(|raw| {
                ApplicationStatus::parse(raw)
                    .ok_or_else(|| AppError::Validation(format!("unknown status '{raw}'")))
            })
            .transpose()?;

        let risk_score = update.risk_score.map(validate_risk_score).transpose()?;

        let mut tx = self.kernel.db_pool.begin().await?;

        let application = Application::find_by_id_for_update(&mut tx, id)
            .await?
            .ok_or(AppError::ApplicationNotFound(id))?;

        if let Some(target) = new_status {
            validate_transition(application.status, target)?;
        }

        sqlx::query("SELECT set_config('app.changed_by', 'admin', true)")
            .execute(&mut *tx)
            .await?;

        let banking_patch = update.banking_data.map(Value::Object);
        let updated = Application::apply_admin_update(
            &mut tx,
            id,
            new_status,
            risk_score,
            banking_patch.as_ref(),
            update.rejection_reason.as_deref(),
        )
        .await?;

        tx.commit().await?;

        self.kernel
            .cache
            .invalidate(&country_stats_key(updated.country))
            .await;

        if new_status.is_some() {
            publish_application_update(self.kernel.bus.as_ref(), &updated).await;
        }

        Ok(updated)
    }

    /// Soft delete. Non-final applications are cancelled first so the
    /// audit trail records the exit.
    pub async fn soft_delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut tx = self.kernel.db_pool.begin().await?;

        let application = Application::find_by_id_for_update(&mut tx, id)
            .await?
            .ok_or(AppError::ApplicationNotFound(id))?;

        sqlx::query("SELECT set_config('app.changed_by', 'admin', true)")
            .execute(&mut *tx)
            .await?;

        if !is_final_state(application.status) {
            validate_transition(application.status, ApplicationStatus::Cancelled)?;
            Application::update_status(&mut tx, id, ApplicationStatus::Cancelled).await?;
        }

        Application::soft_delete(&mut tx, id).await?;
        tx.commit().await?;

        self.kernel
            .cache
            .invalidate(&country_stats_key(application.country))
            .await;

        tracing::info!(application_id = %id, "application soft-deleted");
        Ok(())
    }
}

/// Resolve the request currency against the country's expected one.
fn normalize_currency(country: Country, currency: Option<&str>) -> Result<String, AppError> {
    let expected = country.expected_currency();
    match currency {
        None => Ok(expected.to_string()),
        Some(raw) => {
            let upper = raw.to_ascii_uppercase();
            if upper == expected {
                Ok(upper)
            } else {
                Err(AppError::Validation(format!(
                    "currency '{raw}' does not match {} ({country}); expected '{expected}'",
                    country.name()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_currency_defaults_to_the_country() {
        assert_eq!(normalize_currency(Country::ES, None).unwrap(), "EUR");
        assert_eq!(normalize_currency(Country::BR, None).unwrap(), "BRL");
    }

    #[test]
    fn matching_currency_is_normalized_to_uppercase() {
        assert_eq!(normalize_currency(Country::MX, Some("mxn")).unwrap(), "MXN");
    }

    #[test]
    fn mismatched_currency_is_rejected() {
        let err = normalize_currency(Country::CO, Some("USD")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("COP"));
    }
}
