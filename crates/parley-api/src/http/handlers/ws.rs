//! WebSocket handler for real-time agent clients.
//!
//! `GET /ws/connect?token=<api-key>&connection_id=<id>` upgrades to a
//! WebSocket. The token is resolved to a tenant once, at connect time,
//! and stays fixed for the connection's lifetime. Once connected the
//! handler:
//!
//! - **Receives frames:** `subscribe_session`, `unsubscribe_session`,
//!   `send_message`, and `ping`, as JSON text frames.
//! - **Forwards broadcasts:** a per-connection writer task drains an
//!   mpsc channel into the socket; the connection registry holds the
//!   channel's send half, so session broadcasts and direct replies share
//!   one ordered outbound path.
//!
//! Malformed frames are logged and answered with an `error` frame; they
//! never terminate the connection. Registry cleanup runs after the
//! receive loop exits, whatever ended it.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use parley_core::realtime::ConnectionSink;
use parley_types::error::DeliveryError;
use parley_types::message::{Message, MessageDraft, MessageType};

use crate::http::extractors::auth::resolve_tenant_for_key;
use crate::state::AppState;

/// Outbound channel capacity per connection. A client that stops reading
/// fills this up and starts failing the broadcaster's send deadline,
/// which gets it pruned.
const OUTBOUND_BUFFER: usize = 64;

/// Send half of a WebSocket connection, registered with the broadcaster.
#[derive(Clone)]
pub struct WsSink {
    tx: mpsc::Sender<String>,
}

impl ConnectionSink for WsSink {
    async fn send(&self, payload: &str) -> Result<(), DeliveryError> {
        self.tx
            .send(payload.to_string())
            .await
            .map_err(|_| DeliveryError::Closed)
    }
}

/// Query parameters for the WebSocket endpoint.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Tenant-bound API key, resolved once at connect time.
    pub token: String,
    /// Caller-supplied connection identifier, unique per tenant.
    #[serde(default = "default_connection_id")]
    pub connection_id: String,
}

fn default_connection_id() -> String {
    "default".to_string()
}

/// Incoming frame from a WebSocket client.
///
/// Clients send JSON-encoded text frames matching one of these variants.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsFrame {
    /// Subscribe to a session's message stream.
    SubscribeSession { session_id: Uuid },
    /// Drop a session subscription.
    UnsubscribeSession { session_id: Uuid },
    /// Append a message to a session and fan it out to subscribers.
    SendMessage {
        session_id: Uuid,
        content: String,
        #[serde(default)]
        message_type: Option<MessageType>,
        #[serde(default)]
        sender_id: Option<String>,
    },
    /// Keep-alive ping. Server responds with `{"type":"pong"}`.
    Ping,
}

/// Payload broadcast to a session's subscribers for a stored message.
pub fn new_message_payload(message: &Message) -> serde_json::Value {
    serde_json::json!({
        "type": "new_message",
        "message": message,
    })
}

/// Upgrade an HTTP request to a WebSocket connection.
///
/// Mounted at `/ws/connect`. An unresolvable token is rejected before
/// the upgrade with 401.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let tenant_id = match resolve_tenant_for_key(&state, &query.token).await {
        Ok(tenant_id) => tenant_id,
        Err(_) => {
            tracing::warn!(connection_id = %query.connection_id, "WebSocket auth failed");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| {
        handle_ws_connection(socket, state, tenant_id, query.connection_id)
    })
}

/// Core WebSocket connection handler.
///
/// One receive loop per connection; outbound traffic runs on a separate
/// writer task fed by the registered [`WsSink`]. When the receive loop
/// ends -- clean close, transport error, or client vanishing -- the
/// connection is removed from the registry along with every session
/// subscription it held.
async fn handle_ws_connection(
    socket: WebSocket,
    state: AppState,
    tenant_id: Uuid,
    connection_id: String,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let sink = WsSink { tx: tx.clone() };
    state.broadcaster.connect(tenant_id, &connection_id, sink);

    tracing::info!(
        %tenant_id,
        connection_id,
        connections = state.broadcaster.tenant_connection_count(&tenant_id),
        "WebSocket connected"
    );

    // Writer task: drain the outbound channel into the socket.
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(WsMessage::Text(text)) => {
                process_frame(&text, &state, tenant_id, &connection_id, &tx).await;
            }
            Ok(WsMessage::Close(_)) => break,
            Err(err) => {
                tracing::debug!(connection_id, "WebSocket receive error: {err}");
                break;
            }
            // Ignore binary, ping, pong protocol frames (handled by axum/tungstenite)
            Ok(_) => {}
        }
    }

    // Guaranteed cleanup: runs on clean close and on error alike.
    state.broadcaster.disconnect(tenant_id, &connection_id);
    drop(tx);
    writer.abort();

    tracing::info!(%tenant_id, connection_id, "WebSocket disconnected");
}

/// Parse and process a single frame from the WebSocket client.
async fn process_frame(
    text: &str,
    state: &AppState,
    tenant_id: Uuid,
    connection_id: &str,
    tx: &mpsc::Sender<String>,
) {
    let frame: WsFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::warn!(
                raw = %text,
                error = %err,
                "Ignoring malformed WebSocket frame"
            );
            reply(
                tx,
                serde_json::json!({"type": "error", "message": "malformed frame"}),
            )
            .await;
            return;
        }
    };

    match frame {
        WsFrame::SubscribeSession { session_id } => {
            let ok = state
                .broadcaster
                .subscribe(&session_id, &tenant_id, connection_id)
                .await;
            let kind = if ok {
                "subscription_confirmed"
            } else {
                "subscription_denied"
            };
            reply(
                tx,
                serde_json::json!({"type": kind, "session_id": session_id}),
            )
            .await;
        }

        WsFrame::UnsubscribeSession { session_id } => {
            state.broadcaster.unsubscribe(&session_id, connection_id);
        }

        WsFrame::SendMessage {
            session_id,
            content,
            message_type,
            sender_id,
        } => {
            let sender = sender_id.unwrap_or_else(|| connection_id.to_string());
            let draft = MessageDraft::staff(sender, content)
                .with_message_type(message_type.unwrap_or(MessageType::Text));

            match state.message_store.append(&tenant_id, &session_id, draft).await {
                Ok(message) => {
                    state
                        .broadcaster
                        .broadcast_to_session(&session_id, &new_message_payload(&message))
                        .await;
                }
                Err(err) => {
                    tracing::warn!(
                        %session_id,
                        %tenant_id,
                        connection_id,
                        error = %err,
                        "send_message rejected"
                    );
                    reply(
                        tx,
                        serde_json::json!({
                            "type": "error",
                            "session_id": session_id,
                            "message": err.to_string(),
                        }),
                    )
                    .await;
                }
            }
        }

        WsFrame::Ping => {
            reply(tx, serde_json::json!({"type": "pong"})).await;
        }
    }
}

/// Send a direct reply to this connection, ignoring a closed channel.
async fn reply(tx: &mpsc::Sender<String>, payload: serde_json::Value) {
    let text = match serde_json::to_string(&payload) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize WebSocket reply");
            return;
        }
    };
    if tx.send(text).await.is_err() {
        tracing::debug!("reply dropped: connection closing");
    }
}
