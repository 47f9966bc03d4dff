//! Bus abstraction over NATS for production and testing.
//!
//! Workers publish application updates here after commit; the notification
//! bridge in the API process subscribes and fans out to WebSocket clients.
//! Delivery is at-least-once — subscribers treat repeats as idempotent.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::RwLock;

/// The single logical channel for application updates.
pub const BROADCAST_CHANNEL: &str = "websocket:broadcast";

/// A published message.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub subject: String,
    pub payload: Bytes,
}

/// Trait for bus publish operations.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Publish a message to a subject.
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()>;
}

/// Real NATS client publisher.
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }
}

#[async_trait]
impl BusPublisher for NatsBus {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        self.client.publish(subject, payload).await?;
        Ok(())
    }
}

/// Mock bus that records published messages for testing.
#[derive(Default)]
pub struct TestBus {
    published: RwLock<Vec<PublishedMessage>>,
}

impl TestBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published_messages(&self) -> Vec<PublishedMessage> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn messages_for_subject(&self, subject: &str) -> Vec<PublishedMessage> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    pub fn publish_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn clear(&self) {
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Deserialize a published payload as JSON.
    pub fn deserialize_message<T: serde::de::DeserializeOwned>(
        &self,
        msg: &PublishedMessage,
    ) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&msg.payload)
    }
}

#[async_trait]
impl BusPublisher for TestBus {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedMessage { subject, payload });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bus_records_published_messages() {
        let bus = TestBus::new();
        bus.publish(
            BROADCAST_CHANNEL.to_string(),
            Bytes::from(r#"{"type":"application_update"}"#),
        )
        .await
        .unwrap();

        assert_eq!(bus.publish_count(), 1);
        assert_eq!(bus.messages_for_subject(BROADCAST_CHANNEL).len(), 1);
        assert!(bus.messages_for_subject("other").is_empty());
    }

    #[tokio::test]
    async fn clear_drops_recorded_messages() {
        let bus = TestBus::new();
        bus.publish("a".into(), Bytes::new()).await.unwrap();
        bus.clear();
        assert_eq!(bus.publish_count(), 0);
    }
}
