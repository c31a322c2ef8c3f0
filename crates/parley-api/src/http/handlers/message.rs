//! Message HTTP handlers: search, status updates, statistics.
//!
//! Endpoints:
//! - GET /api/v1/messages/search       - Substring search across the tenant's messages
//! - PUT /api/v1/messages/{id}/status  - Update a message's delivery status
//! - GET /api/v1/messages/statistics   - Aggregate counts by type and sender

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use parley_core::message::SearchFilter;
use parley_types::message::MessageStatus;

use crate::http::error::AppError;
use crate::http::extractors::auth::TenantAuth;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Query parameters for message search.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Substring to look for in message content.
    pub q: String,
    pub session_id: Option<Uuid>,
    pub sender_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Request body for a message status update.
#[derive(Debug, Deserialize)]
pub struct MessageStatusRequest {
    pub status: MessageStatus,
}

/// Query parameters for statistics.
#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// GET /api/v1/messages/search - Search message content.
pub async fn search_messages(
    State(state): State<AppState>,
    TenantAuth(tenant_id): TenantAuth,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<serde_json::Value>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    if query.q.is_empty() {
        return Err(AppError::Validation("search query is empty".to_string()));
    }

    let filter = SearchFilter {
        session_id: query.session_id,
        sender_id: query.sender_id,
        start: query.start,
        end: query.end,
    };
    let messages = state
        .message_store
        .search(&tenant_id, &query.q, &filter, query.limit, query.offset)
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let messages_json = messages
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let resp = ApiResponse::success(messages_json, request_id, elapsed)
        .with_link("self", "/api/v1/messages/search");

    Ok(Json(resp))
}

/// PUT /api/v1/messages/{id}/status - Update a message's delivery status.
pub async fn update_message_status(
    State(state): State<AppState>,
    TenantAuth(tenant_id): TenantAuth,
    Path(message_id): Path<i64>,
    Json(body): Json<MessageStatusRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let message = state
        .message_store
        .update_status(&tenant_id, message_id, body.status)
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let message_json = serde_json::to_value(&message)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let resp = ApiResponse::success(message_json, request_id, elapsed);

    Ok(Json(resp))
}

/// GET /api/v1/messages/statistics - Aggregate message counts.
pub async fn get_statistics(
    State(state): State<AppState>,
    TenantAuth(tenant_id): TenantAuth,
    Query(query): Query<StatisticsQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let stats = state
        .message_store
        .statistics(&tenant_id, query.start, query.end)
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let stats_json = serde_json::to_value(&stats)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let resp = ApiResponse::success(stats_json, request_id, elapsed)
        .with_link("self", "/api/v1/messages/statistics");

    Ok(Json(resp))
}
