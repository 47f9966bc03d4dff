//! Real-time fan-out: bus payloads, the connection manager and the
//! NATS → WebSocket notification bridge.

pub mod bridge;
pub mod manager;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::common::decimal::opt_decimal_to_string;
use crate::kernel::bus::{BusPublisher, BROADCAST_CHANNEL};
use crate::store::Application;

pub use bridge::NotificationBridge;
pub use manager::{ClientConnection, ConnectionManager};

/// The message carried on `websocket:broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationUpdate {
    #[serde(rename = "type")]
    pub message_type: String,
    pub data: ApplicationUpdateData,
    pub broadcast: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationUpdateData {
    pub id: String,
    pub status: String,
    pub risk_score: Option<String>,
    pub updated_at: Option<String>,
}

pub const APPLICATION_UPDATE: &str = "application_update";

impl ApplicationUpdate {
    pub fn for_application(app: &Application) -> Self {
        ApplicationUpdate {
            message_type: APPLICATION_UPDATE.to_string(),
            data: ApplicationUpdateData {
                id: app.id.to_string(),
                status: app.status.as_str().to_string(),
                risk_score: opt_decimal_to_string(app.risk_score),
                updated_at: Some(iso8601(app.updated_at)),
            },
            broadcast: true,
        }
    }
}

fn iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Publish an application update to the bus. Each publish follows a
/// successful commit, so subscribers observe the linear order of
/// committed states. Failures are logged, never propagated: a missed
/// notification must not fail the state change that produced it.
pub async fn publish_application_update(bus: &dyn BusPublisher, app: &Application) {
    let update = ApplicationUpdate::for_application(app);
    let payload = match serde_json::to_vec(&update) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize application update");
            return;
        }
    };

    if let Err(e) = bus.publish(BROADCAST_CHANNEL.to_string(), payload).await {
        tracing::warn!(
            application_id = %app.id,
            error = %e,
            "failed to publish application update"
        );
    } else {
        tracing::debug!(
            application_id = %app.id,
            status = %app.status,
            "application update published"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{ApplicationStatus, Country};
    use crate::kernel::bus::TestBus;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn sample_app() -> Application {
        Application {
            id: Uuid::new_v4(),
            country: Country::ES,
            full_name: vec![],
            identity_document: vec![],
            document_digest: vec![],
            requested_amount: Decimal::from(10_000),
            monthly_income: Decimal::from(3_000),
            currency: "EUR".into(),
            idempotency_key: None,
            status: ApplicationStatus::Approved,
            country_specific_data: serde_json::json!({}),
            banking_data: serde_json::json!({}),
            validation_errors: serde_json::json!([]),
            risk_score: Some("12.5".parse().unwrap()),
            rejection_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn publishes_on_the_broadcast_channel() {
        let bus = TestBus::new();
        let app = sample_app();
        publish_application_update(&bus, &app).await;

        let messages = bus.messages_for_subject(BROADCAST_CHANNEL);
        assert_eq!(messages.len(), 1);

        let update: ApplicationUpdate = bus.deserialize_message(&messages[0]).unwrap();
        assert_eq!(update.message_type, APPLICATION_UPDATE);
        assert_eq!(update.data.id, app.id.to_string());
        assert_eq!(update.data.status, "APPROVED");
        assert_eq!(update.data.risk_score.as_deref(), Some("12.50"));
        assert!(update.broadcast);
    }
}
