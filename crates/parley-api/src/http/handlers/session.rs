//! Session lifecycle HTTP handlers.
//!
//! Endpoints:
//! - POST /api/v1/sessions               - Create-or-get the user's open session (idempotent)
//! - GET  /api/v1/sessions               - List sessions (filters + pagination)
//! - GET  /api/v1/sessions/{id}          - Get a single session
//! - PUT  /api/v1/sessions/{id}/status   - Apply a status transition
//! - GET  /api/v1/sessions/{id}/messages - List messages, newest first

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use parley_core::message::MessageFilter;
use parley_core::session::SessionFilter;
use parley_types::message::MessageType;
use parley_types::session::{ExtraData, SessionStatus};

use crate::http::error::AppError;
use crate::http::extractors::auth::TenantAuth;
use crate::http::handlers::parse_uuid;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for session creation.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Platform-qualified user id, e.g. `"webchat:alice"`.
    pub user_id: String,
    pub platform: String,
    /// Merged into `extra_data` when a new session is created.
    #[serde(default)]
    pub extra_data: Option<ExtraData>,
}

/// Query parameters for session listing.
#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub status: Option<SessionStatus>,
    pub assigned_staff_id: Option<Uuid>,
    pub platform: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

/// Request body for a status update.
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: SessionStatus,
    #[serde(default)]
    pub assigned_staff_id: Option<Uuid>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Query parameters for message listing.
#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    pub message_type: Option<MessageType>,
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    #[serde(default = "default_message_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_message_limit() -> i64 {
    50
}

/// POST /api/v1/sessions - Create-or-get the user's open session.
pub async fn create_or_get_session(
    State(state): State<AppState>,
    TenantAuth(tenant_id): TenantAuth,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let session = state
        .lifecycle
        .create_or_get_open(&tenant_id, &body.user_id, &body.platform, body.extra_data)
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let session_json = serde_json::to_value(&session)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let resp = ApiResponse::success(session_json, request_id, elapsed)
        .with_link("self", &format!("/api/v1/sessions/{}", session.id))
        .with_link("messages", &format!("/api/v1/sessions/{}/messages", session.id));

    Ok(Json(resp))
}

/// GET /api/v1/sessions - List sessions for the caller's tenant.
pub async fn list_sessions(
    State(state): State<AppState>,
    TenantAuth(tenant_id): TenantAuth,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<ApiResponse<Vec<serde_json::Value>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let filter = SessionFilter {
        status: query.status,
        assigned_staff_id: query.assigned_staff_id,
        platform: query.platform,
    };
    let sessions = state
        .lifecycle
        .list(&tenant_id, &filter, query.limit, query.offset)
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let sessions_json = sessions
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let resp = ApiResponse::success(sessions_json, request_id, elapsed)
        .with_link("self", "/api/v1/sessions");

    Ok(Json(resp))
}

/// GET /api/v1/sessions/{id} - Get a session by id.
pub async fn get_session(
    State(state): State<AppState>,
    TenantAuth(tenant_id): TenantAuth,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let session = state.lifecycle.get(&sid, &tenant_id).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let session_json = serde_json::to_value(&session)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let resp = ApiResponse::success(session_json, request_id, elapsed)
        .with_link("self", &format!("/api/v1/sessions/{}", session.id))
        .with_link("messages", &format!("/api/v1/sessions/{}/messages", session.id));

    Ok(Json(resp))
}

/// PUT /api/v1/sessions/{id}/status - Apply a status transition.
pub async fn update_session_status(
    State(state): State<AppState>,
    TenantAuth(tenant_id): TenantAuth,
    Path(session_id): Path<String>,
    Json(body): Json<StatusUpdateRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let session = state
        .lifecycle
        .update_status(&sid, &tenant_id, body.status, body.assigned_staff_id, body.reason)
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let session_json = serde_json::to_value(&session)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let resp = ApiResponse::success(session_json, request_id, elapsed)
        .with_link("self", &format!("/api/v1/sessions/{}", session.id));

    Ok(Json(resp))
}

/// GET /api/v1/sessions/{id}/messages - List messages, newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    TenantAuth(tenant_id): TenantAuth,
    Path(session_id): Path<String>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ApiResponse<Vec<serde_json::Value>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let filter = MessageFilter {
        message_type: query.message_type,
        before: query.before,
        after: query.after,
    };
    let messages = state
        .message_store
        .list_by_session(&tenant_id, &sid, &filter, query.limit, query.offset)
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let messages_json = messages
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let resp = ApiResponse::success(messages_json, request_id, elapsed)
        .with_link("self", &format!("/api/v1/sessions/{}/messages", session_id))
        .with_link("session", &format!("/api/v1/sessions/{}", session_id));

    Ok(Json(resp))
}
