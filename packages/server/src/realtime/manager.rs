//! WebSocket connection manager.
//!
//! Owns `{conn_id -> connection}` and `{application_id -> set<conn_id>}`.
//! A failed delivery evicts the connection and cleans its subscriptions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

/// A live client the manager can push JSON to. The axum route wraps the
/// socket sender; tests plug in recorders.
#[async_trait::async_trait]
pub trait ClientConnection: Send + Sync {
    async fn send_json(&self, message: &serde_json::Value) -> anyhow::Result<()>;
}

#[derive(Default)]
struct State {
    connections: HashMap<String, Arc<dyn ClientConnection>>,
    subscriptions: HashMap<Uuid, HashSet<String>>,
}

#[derive(Clone, Default)]
pub struct ConnectionManager {
    state: Arc<RwLock<State>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self, connection_id: String, connection: Arc<dyn ClientConnection>) {
        let mut state = self.state.write().await;
        state.connections.insert(connection_id.clone(), connection);
        tracing::debug!(
            connection_id,
            total = state.connections.len(),
            "websocket connected"
        );
    }

    pub async fn disconnect(&self, connection_id: &str) {
        let mut state = self.state.write().await;
        state.connections.remove(connection_id);
        state.subscriptions.retain(|_, conns| {
            conns.remove(connection_id);
            !conns.is_empty()
        });
        tracing::debug!(
            connection_id,
            total = state.connections.len(),
            "websocket disconnected"
        );
    }

    pub async fn subscribe(&self, connection_id: &str, application_id: Uuid) {
        let mut state = self.state.write().await;
        if !state.connections.contains_key(connection_id) {
            return;
        }
        state
            .subscriptions
            .entry(application_id)
            .or_default()
            .insert(connection_id.to_string());
        tracing::debug!(connection_id, %application_id, "subscribed to application");
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    pub async fn subscriber_count(&self, application_id: Uuid) -> usize {
        self.state
            .read()
            .await
            .subscriptions
            .get(&application_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Deliver to every live connection.
    pub async fn broadcast_to_all(&self, message: &serde_json::Value) {
        let targets: Vec<(String, Arc<dyn ClientConnection>)> = {
            let state = self.state.read().await;
            state
                .connections
                .iter()
                .map(|(id, conn)| (id.clone(), conn.clone()))
                .collect()
        };
        self.deliver(targets, message).await;
    }

    /// Deliver only to connections subscribed to this application.
    pub async fn broadcast_to_application(
        &self,
        application_id: Uuid,
        message: &serde_json::Value,
    ) {
        let targets: Vec<(String, Arc<dyn ClientConnection>)> = {
            let state = self.state.read().await;
            let Some(subscribers) = state.subscriptions.get(&application_id) else {
                return;
            };
            subscribers
                .iter()
                .filter_map(|id| {
                    state
                        .connections
                        .get(id)
                        .map(|conn| (id.clone(), conn.clone()))
                })
                .collect()
        };
        self.deliver(targets, message).await;
    }

    async fn deliver(
        &self,
        targets: Vec<(String, Arc<dyn ClientConnection>)>,
        message: &serde_json::Value,
    ) {
        for (connection_id, connection) in targets {
            if let Err(e) = connection.send_json(message).await {
                tracing::warn!(
                    connection_id,
                    error = %e,
                    "delivery failed, removing connection"
                );
                self.disconnect(&connection_id).await;
            }
        }
    }
}
