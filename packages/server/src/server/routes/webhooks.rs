//! Bank-confirmation webhook receiver.
//!
//! Verification order matters: signature and size checks run before any
//! database work. Idempotency is durable — the `webhook_events` row is
//! committed before the application mutation, so a crash mid-processing
//! leaves a retryable record instead of double-applying.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use crate::common::decimal::opt_decimal_to_string;
use crate::common::errors::AppError;
use crate::common::types::ApplicationStatus;
use crate::realtime::publish_application_update;
use crate::server::app::AppState;
use crate::store::{Application, WebhookEvent};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

const DOCUMENT_REJECTION_REASON: &str = "Document verification failed by banking provider";

#[derive(Debug, Deserialize)]
pub struct BankConfirmation {
    pub application_id: Uuid,
    pub document_verified: bool,
    #[serde(default)]
    pub credit_score: Option<i32>,
    #[serde(default)]
    pub total_debt: Option<Decimal>,
    #[serde(default)]
    pub monthly_obligations: Option<Decimal>,
    pub has_defaults: bool,
    pub provider_reference: String,
    pub verified_at: DateTime<Utc>,
}

impl BankConfirmation {
    fn validate(&self) -> Result<(), AppError> {
        if self.provider_reference.trim().is_empty() {
            return Err(AppError::Validation(
                "Missing provider_reference in webhook payload (required for idempotency)".into(),
            ));
        }
        if let Some(score) = self.credit_score {
            if !(300..=850).contains(&score) {
                return Err(AppError::Validation(format!(
                    "credit_score must be between 300 and 850 (got {score})"
                )));
            }
        }
        for (name, value) in [
            ("total_debt", self.total_debt),
            ("monthly_obligations", self.monthly_obligations),
        ] {
            if let Some(v) = value {
                if v < Decimal::ZERO {
                    return Err(AppError::Validation(format!("{name} cannot be negative")));
                }
            }
        }
        Ok(())
    }
}

/// Constant-time HMAC-SHA256 verification of the raw body. Accepts a bare
/// hex digest or the `sha256=`-prefixed form.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let hex_digest = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Compute the signature for a payload (test and client tooling).
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub async fn bank_confirmation(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::Unauthorized(
                "Missing webhook signature (X-Webhook-Signature header required)".into(),
            )
        })?;

    let limit = state.kernel.config.max_payload_size_bytes();
    let body = axum::body::to_bytes(request.into_body(), limit)
        .await
        .map_err(|_| AppError::PayloadTooLarge {
            limit_mb: state.kernel.config.max_payload_size_mb,
        })?;

    if !verify_signature(&state.kernel.config.webhook_secret, &body, &signature) {
        tracing::warn!("invalid webhook signature received");
        return Err(AppError::Unauthorized("Invalid webhook signature".into()));
    }

    let payload_json: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {e}")))?;
    let confirmation: BankConfirmation = serde_json::from_value(payload_json.clone())
        .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {e}")))?;
    confirmation.validate()?;

    let idempotency_key = confirmation.provider_reference.clone();

    // Find or create the event row; its unique key is the sole replay
    // coordinator.
    let event = match WebhookEvent::find_by_idempotency_key(
        &state.kernel.db_pool,
        &idempotency_key,
    )
    .await?
    {
        Some(existing) if existing.is_already_processed() => {
            tracing::info!(%idempotency_key, "webhook already processed");
            return Ok(Json(already_processed_response(&existing)));
        }
        Some(existing) => {
            tracing::info!(
                %idempotency_key,
                previous_status = ?existing.status,
                "retrying previously failed webhook"
            );
            let mut tx = state.kernel.db_pool.begin().await?;
            WebhookEvent::reset_for_retry(&mut tx, existing.id).await?;
            tx.commit().await?;
            existing
        }
        None => {
            // Target must exist before an event is recorded; no decryption
            // happens on this path.
            Application::find_by_id(&state.kernel.db_pool, confirmation.application_id, false)
                .await?
                .ok_or(AppError::ApplicationNotFound(confirmation.application_id))?;

            let mut tx = state.kernel.db_pool.begin().await?;
            let inserted = WebhookEvent::insert_processing(
                &mut tx,
                &idempotency_key,
                confirmation.application_id,
                &payload_json,
            )
            .await?;
            tx.commit().await?;

            match inserted {
                Some(event) => event,
                None => {
                    // Lost the race to a concurrent first delivery.
                    let existing = WebhookEvent::find_by_idempotency_key(
                        &state.kernel.db_pool,
                        &idempotency_key,
                    )
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(anyhow::anyhow!(
                            "webhook event vanished after conflict"
                        ))
                    })?;
                    if existing.is_already_processed() {
                        return Ok(Json(already_processed_response(&existing)));
                    }
                    let mut tx = state.kernel.db_pool.begin().await?;
                    WebhookEvent::reset_for_retry(&mut tx, existing.id).await?;
                    tx.commit().await?;
                    existing
                }
            }
        }
    };

    tracing::info!(
        application_id = %confirmation.application_id,
        document_verified = confirmation.document_verified,
        %idempotency_key,
        "received bank confirmation webhook"
    );

    let updated = match apply_confirmation(&state, &confirmation).await {
        Ok(app) => app,
        Err(e) => {
            WebhookEvent::mark_failed(&state.kernel.db_pool, event.id, &e.to_string()).await?;
            return Err(e);
        }
    };

    let mut tx = state.kernel.db_pool.begin().await?;
    WebhookEvent::mark_processed(&mut tx, event.id).await?;
    tx.commit().await?;

    // A publish failure must not fail the webhook.
    publish_application_update(state.kernel.bus.as_ref(), &updated).await;

    Ok(Json(json!({
        "message": "Webhook processed",
        "data": {
            "application_id": confirmation.application_id.to_string(),
            "already_processed": false,
            "status": updated.status.as_str(),
        }
    })))
}

/// Merge the confirmation into banking_data and apply the verification
/// outcome.
async fn apply_confirmation(
    state: &AppState,
    confirmation: &BankConfirmation,
) -> Result<Application, AppError> {
    let mut tx = state.kernel.db_pool.begin().await?;

    let application = Application::find_by_id_for_update(&mut tx, confirmation.application_id)
        .await?
        .ok_or(AppError::ApplicationNotFound(confirmation.application_id))?;

    let patch = json!({
        "document_verified": confirmation.document_verified,
        "credit_score": confirmation.credit_score,
        "total_debt": opt_decimal_to_string(confirmation.total_debt),
        "monthly_obligations": opt_decimal_to_string(confirmation.monthly_obligations),
        "has_defaults": confirmation.has_defaults,
        "provider_reference": confirmation.provider_reference,
        "verified_at": confirmation.verified_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        "webhook_received": true,
    });

    let (new_status, appended_errors): (Option<ApplicationStatus>, Vec<String>) =
        if confirmation.document_verified {
            (None, Vec::new())
        } else {
            tracing::warn!(
                application_id = %application.id,
                "bank provider rejected the document"
            );
            (
                Some(ApplicationStatus::Rejected),
                vec![DOCUMENT_REJECTION_REASON.to_string()],
            )
        };

    let updated = Application::apply_bank_confirmation(
        &mut tx,
        application.id,
        &patch,
        new_status,
        &appended_errors,
    )
    .await?;

    tx.commit().await?;
    Ok(updated)
}

fn already_processed_response(event: &WebhookEvent) -> serde_json::Value {
    json!({
        "message": "Webhook already processed",
        "data": {
            "application_id": event.application_id.to_string(),
            "already_processed": true,
            "processed_at": event
                .processed_at
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret_of_decent_length";

    #[test]
    fn signature_round_trips() {
        let body = br#"{"application_id":"x"}"#;
        let signature = sign_payload(SECRET, body);
        assert!(verify_signature(SECRET, body, &signature));
        assert!(verify_signature(SECRET, body, &format!("sha256={signature}")));
    }

    #[test]
    fn tampered_body_fails_verification() {
        let signature = sign_payload(SECRET, b"original");
        assert!(!verify_signature(SECRET, b"tampered", &signature));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let signature = sign_payload(SECRET, b"body");
        assert!(!verify_signature("other_secret", b"body", &signature));
    }

    #[test]
    fn malformed_signature_fails_closed() {
        assert!(!verify_signature(SECRET, b"body", "not-hex!"));
        assert!(!verify_signature(SECRET, b"body", ""));
    }

    #[test]
    fn confirmation_validation_enforces_ranges() {
        let mut confirmation = sample_confirmation();
        assert!(confirmation.validate().is_ok());

        confirmation.credit_score = Some(299);
        assert!(confirmation.validate().is_err());

        confirmation.credit_score = Some(700);
        confirmation.total_debt = Some(Decimal::from(-1));
        assert!(confirmation.validate().is_err());
    }

    #[test]
    fn empty_provider_reference_is_rejected() {
        let mut confirmation = sample_confirmation();
        confirmation.provider_reference = "  ".into();
        assert!(confirmation.validate().is_err());
    }

    fn sample_confirmation() -> BankConfirmation {
        BankConfirmation {
            application_id: Uuid::new_v4(),
            document_verified: true,
            credit_score: Some(700),
            total_debt: Some(Decimal::from(1000)),
            monthly_obligations: Some(Decimal::from(100)),
            has_defaults: false,
            provider_reference: "REF_A".into(),
            verified_at: Utc::now(),
        }
    }
}
