//! The evaluation pipeline (worker side).
//!
//! Runs under the per-application distributed lock. Transaction A moves
//! PENDING → VALIDATING and publishes; transaction B decrypts PII into
//! locals, calls the provider through the circuit breaker, applies the
//! country rules and writes the outcome back. Each publish follows its
//! commit.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::common::decimal::validate_risk_score;
use crate::common::errors::AppError;
use crate::common::mask::mask_document;
use crate::common::types::ApplicationStatus;
use crate::domain::country::strategy_for;
use crate::domain::risk::{ApprovalRecommendation, BankingData, RiskAssessment};
use crate::domain::state_machine::{is_final_state, validate_transition};
use crate::domain::Strategy;
use crate::kernel::AppKernel;
use crate::providers::BankingProvider;
use crate::realtime::publish_application_update;
use crate::store::Application;

#[derive(Clone)]
pub struct ProcessingService {
    kernel: AppKernel,
    /// Test/integration seam; production resolves the country's provider.
    provider_override: Option<Arc<dyn BankingProvider>>,
}

impl ProcessingService {
    pub fn new(kernel: AppKernel) -> Self {
        ProcessingService {
            kernel,
            provider_override: None,
        }
    }

    pub fn with_provider(kernel: AppKernel, provider: Arc<dyn BankingProvider>) -> Self {
        ProcessingService {
            kernel,
            provider_override: Some(provider),
        }
    }

    /// Evaluate one application. Idempotent: applications already in a
    /// final state return without touching anything.
    pub async fn process_application(&self, application_id: Uuid) -> Result<String, AppError> {
        let application = Application::find_by_id(&self.kernel.db_pool, application_id, false)
            .await?
            .ok_or(AppError::ApplicationNotFound(application_id))?;

        if is_final_state(application.status) {
            tracing::info!(
                %application_id,
                status = %application.status,
                "application already in final state, skipping"
            );
            return Ok(format!(
                "Application {application_id} already processed: {}",
                application.status
            ));
        }

        self.transition_to_validating(application_id).await?;
        let updated = self.evaluate_and_store(application_id).await?;

        self.kernel
            .cache
            .invalidate(&crate::kernel::cache::country_stats_key(updated.country))
            .await;
        publish_application_update(self.kernel.bus.as_ref(), &updated).await;

        tracing::info!(
            %application_id,
            final_status = %updated.status,
            "application processing completed"
        );
        Ok(format!(
            "Application {application_id} processed: {}",
            updated.status
        ))
    }

    /// Transaction A.
    async fn transition_to_validating(&self, application_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.kernel.db_pool.begin().await?;

        let application = Application::find_by_id_for_update(&mut tx, application_id)
            .await?
            .ok_or(AppError::ApplicationNotFound(application_id))?;

        validate_transition(application.status, ApplicationStatus::Validating)?;

        let updated = if application.status == ApplicationStatus::Validating {
            // Re-run after a crashed attempt; no transition to record.
            application
        } else {
            Application::update_status(&mut tx, application_id, ApplicationStatus::Validating)
                .await?
        };

        tx.commit().await?;
        publish_application_update(self.kernel.bus.as_ref(), &updated).await;
        Ok(())
    }

    /// Transaction B.
    async fn evaluate_and_store(&self, application_id: Uuid) -> Result<Application, AppError> {
        let mut tx = self.kernel.db_pool.begin().await?;

        let application = Application::find_by_id_for_update(&mut tx, application_id)
            .await?
            .ok_or(AppError::ApplicationNotFound(application_id))?;

        // Decrypt into locals; the entity keeps carrying ciphertext only.
        let full_name = self
            .kernel
            .cipher
            .decrypt(&mut *tx, &application.full_name)
            .await?;
        let document = self
            .kernel
            .cipher
            .decrypt(&mut *tx, &application.identity_document)
            .await?;

        let strategy = strategy_for(application.country, self.provider_override.clone());

        let banking_data = self
            .fetch_banking_data(&strategy, &document, &full_name)
            .await?;

        let country_specific = application
            .country_specific_data
            .as_object()
            .cloned()
            .unwrap_or_default();

        let assessment = strategy.apply_business_rules(
            application.requested_amount,
            application.monthly_income,
            &banking_data,
            &country_specific,
        );

        let updated = self
            .write_back(&mut tx, &application, &banking_data, &assessment)
            .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn fetch_banking_data(
        &self,
        strategy: &Strategy,
        document: &str,
        full_name: &str,
    ) -> Result<BankingData, AppError> {
        let provider = strategy.provider().clone();
        let breaker = self
            .kernel
            .breakers
            .breaker(strategy.country(), provider.provider_name());

        tracing::info!(
            country = %strategy.country(),
            provider = provider.provider_name(),
            document = %mask_document(document),
            "fetching banking data"
        );

        breaker
            .call(
                self.kernel.config.provider_timeout,
                provider.fetch_banking_data(document, full_name),
            )
            .await
    }

    async fn write_back(
        &self,
        tx: &mut sqlx::PgConnection,
        application: &Application,
        banking_data: &BankingData,
        assessment: &RiskAssessment,
    ) -> Result<Application, AppError> {
        let new_status = match assessment.approval_recommendation {
            ApprovalRecommendation::Approve => ApplicationStatus::Approved,
            ApprovalRecommendation::Reject => ApplicationStatus::Rejected,
            ApprovalRecommendation::Review => ApplicationStatus::UnderReview,
        };
        validate_transition(application.status, new_status)?;

        let mut country_specific = application
            .country_specific_data
            .as_object()
            .cloned()
            .unwrap_or_default();
        country_specific.insert(
            "risk_level".to_string(),
            Value::String(assessment.risk_level.as_str().to_string()),
        );

        Application::apply_evaluation(
            tx,
            application.id,
            &banking_data.to_persisted_json(),
            validate_risk_score(assessment.risk_score)?,
            &Value::Object(country_specific),
            &serde_json::json!(assessment.reasons),
            new_status,
        )
        .await
    }
}
