//! WebSocket endpoint.
//!
//! Clients connect to `/ws`, then send `{"action": "subscribe",
//! "application_id": "..."}` to follow an application or
//! `{"action": "ping"}` as a keepalive. The server pushes
//! `application_update` messages routed by the notification bridge.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::realtime::{ClientConnection, ConnectionManager};
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientMessage {
    Subscribe { application_id: Uuid },
    Ping,
}

/// A connected client wrapped for the connection manager.
struct WsClient {
    sender: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait::async_trait]
impl ClientConnection for WsClient {
    async fn send_json(&self, message: &serde_json::Value) -> anyhow::Result<()> {
        let text = serde_json::to_string(message)?;
        self.sender.lock().await.send(Message::Text(text)).await?;
        Ok(())
    }
}

pub async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(state.manager.clone(), socket))
}

async fn handle_socket(manager: ConnectionManager, socket: WebSocket) {
    let connection_id = Uuid::new_v4().to_string();
    let (sender, receiver) = socket.split();

    let client = Arc::new(WsClient {
        sender: Mutex::new(sender),
    });
    manager.connect(connection_id.clone(), client.clone()).await;

    read_loop(&manager, &connection_id, client.as_ref(), receiver).await;

    manager.disconnect(&connection_id).await;
}

async fn read_loop(
    manager: &ConnectionManager,
    connection_id: &str,
    client: &WsClient,
    mut receiver: SplitStream<WebSocket>,
) {
    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Subscribe { application_id }) => {
                manager.subscribe(connection_id, application_id).await;
                let ack = serde_json::json!({
                    "type": "subscribed",
                    "application_id": application_id.to_string(),
                });
                if client.send_json(&ack).await.is_err() {
                    break;
                }
            }
            Ok(ClientMessage::Ping) => {
                let pong = serde_json::json!({"type": "pong"});
                if client.send_json(&pong).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(connection_id, error = %e, "unparseable client message");
                let err = serde_json::json!({
                    "type": "error",
                    "detail": "expected {\"action\": \"subscribe\"|\"ping\", ...}",
                });
                if client.send_json(&err).await.is_err() {
                    break;
                }
            }
        }
    }
}
