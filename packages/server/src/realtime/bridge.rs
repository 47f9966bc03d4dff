//! Notification bridge: NATS subscriber → WebSocket fan-out.
//!
//! One subscriber per API process listens on `websocket:broadcast` and
//! routes each message through the connection manager. Reconnects use
//! exponential backoff (1s → 30s); past the retry cap the bridge logs
//! critical and returns so the process supervisor restarts it.

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::kernel::bus::BROADCAST_CHANNEL;
use crate::realtime::ConnectionManager;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 10;

pub struct NotificationBridge {
    nats_url: String,
    manager: ConnectionManager,
}

impl NotificationBridge {
    pub fn new(nats_url: String, manager: ConnectionManager) -> Self {
        NotificationBridge { nats_url, manager }
    }

    /// Subscribe and forward until shutdown or the retry cap.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut retries = 0u32;
        let mut backoff = INITIAL_BACKOFF;

        while retries < MAX_RETRIES {
            if shutdown.is_cancelled() {
                return;
            }

            match self.subscribe_and_forward(&shutdown).await {
                Ok(()) => return, // clean shutdown
                Err(e) => {
                    retries += 1;
                    tracing::error!(
                        error = %e,
                        retries,
                        backoff_secs = backoff.as_secs(),
                        "notification bridge lost the bus, reconnecting"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        tracing::error!(
            retries,
            "notification bridge exhausted reconnect attempts, exiting for supervisor restart"
        );
    }

    async fn subscribe_and_forward(&self, shutdown: &CancellationToken) -> anyhow::Result<()> {
        let client = async_nats::connect(&self.nats_url).await?;
        let mut subscription = client.subscribe(BROADCAST_CHANNEL.to_string()).await?;
        tracing::info!(channel = BROADCAST_CHANNEL, "notification bridge subscribed");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                message = subscription.next() => {
                    match message {
                        Some(msg) => self.handle_message(&msg.payload).await,
                        None => anyhow::bail!("bus subscription closed"),
                    }
                }
            }
        }
    }

    async fn handle_message(&self, payload: &[u8]) {
        let message: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed bus message");
                return;
            }
        };

        route_message(&self.manager, &message).await;
    }
}

/// Route one bus message: broadcast to everyone, or only to the
/// subscribers of the application named in `data.id`.
pub async fn route_message(manager: &ConnectionManager, message: &serde_json::Value) {
    let broadcast = message
        .get("broadcast")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    if broadcast {
        manager.broadcast_to_all(message).await;
        return;
    }

    let application_id = message
        .get("data")
        .and_then(|d| d.get("id"))
        .and_then(serde_json::Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok());

    match application_id {
        Some(id) => manager.broadcast_to_application(id, message).await,
        None => tracing::warn!("bus message without data.id, dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::manager::ClientConnection;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        received: Mutex<Vec<serde_json::Value>>,
    }

    #[async_trait::async_trait]
    impl ClientConnection for Recorder {
        async fn send_json(&self, message: &serde_json::Value) -> anyhow::Result<()> {
            self.received
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(message.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn broadcast_messages_reach_all_connections() {
        let manager = ConnectionManager::new();
        let conn = Arc::new(Recorder::default());
        manager.connect("c".into(), conn.clone()).await;

        let message = serde_json::json!({
            "type": "application_update",
            "data": {"id": Uuid::new_v4().to_string()},
            "broadcast": true,
        });
        route_message(&manager, &message).await;

        assert_eq!(conn.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn targeted_messages_respect_subscriptions() {
        let manager = ConnectionManager::new();
        let subscriber = Arc::new(Recorder::default());
        let bystander = Arc::new(Recorder::default());
        manager.connect("sub".into(), subscriber.clone()).await;
        manager.connect("other".into(), bystander.clone()).await;

        let app_id = Uuid::new_v4();
        manager.subscribe("sub", app_id).await;

        let message = serde_json::json!({
            "type": "application_update",
            "data": {"id": app_id.to_string()},
            "broadcast": false,
        });
        route_message(&manager, &message).await;

        assert_eq!(subscriber.received.lock().unwrap().len(), 1);
        assert!(bystander.received.lock().unwrap().is_empty());
    }
}
