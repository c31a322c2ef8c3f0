//! Webhook receiver handler: the platform-ingestion entry point.
//!
//! An upstream messaging platform (webchat widget, Telegram bridge, ...)
//! delivers inbound user messages here. The pipeline is create-or-get
//! session, append, then real-time fan-out to the session's subscribers.
//! Signature verification of the upstream delivery is out of scope; the
//! caller authenticates with the same tenant-bound API key as the REST
//! surface.

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use parley_types::message::MessageType;

use crate::http::error::AppError;
use crate::http::extractors::auth::TenantAuth;
use crate::http::handlers::ws::new_message_payload;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Inbound message delivery from a platform integration.
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    /// Platform-qualified user id, e.g. `"telegram:42"`.
    pub user_id: String,
    pub platform: String,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
}

/// POST /api/v1/webhooks/messages - Ingest an inbound platform message.
pub async fn receive_message(
    State(state): State<AppState>,
    TenantAuth(tenant_id): TenantAuth,
    Json(body): Json<IncomingMessage>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let (session, message) = state
        .message_store
        .ingest(
            &tenant_id,
            &body.user_id,
            &body.platform,
            body.content,
            body.message_type,
        )
        .await?;

    // Push to live subscribers. Best effort by design: delivery failures
    // are handled inside the broadcaster and never fail the ingest.
    let delivered = state
        .broadcaster
        .broadcast_to_session(&session.id, &new_message_payload(&message))
        .await;

    tracing::info!(
        message_id = message.id,
        session_id = %session.id,
        tenant_id = %tenant_id,
        delivered,
        "webhook message ingested"
    );

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(
        serde_json::json!({
            "session_id": session.id,
            "session_status": session.status,
            "message": message,
            "subscribers_notified": delivered,
        }),
        request_id,
        elapsed,
    )
    .with_link("session", &format!("/api/v1/sessions/{}", session.id));

    Ok(Json(resp))
}
