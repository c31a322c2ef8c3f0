//! Context window handler for AI-feature callers.
//!
//! POST /api/v1/sessions/{id}/context - Assemble a token-budgeted,
//! chronologically ordered message window for a completion call. The
//! completion call itself happens elsewhere; this endpoint only returns
//! the `role`/`content` sequence.

use std::time::Instant;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use parley_core::context::builder::DEFAULT_WINDOW_SIZE;
use parley_core::context::ContextParams;
use parley_core::context::tokens::estimate_total;

use crate::http::error::AppError;
use crate::http::extractors::auth::TenantAuth;
use crate::http::handlers::parse_uuid;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for a context window.
#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_window_size")]
    pub window_size: i64,
    #[serde(default)]
    pub include_session_summary: bool,
}

fn default_max_tokens() -> u32 {
    4_000
}

fn default_window_size() -> i64 {
    DEFAULT_WINDOW_SIZE
}

/// POST /api/v1/sessions/{id}/context - Build a context window.
pub async fn build_context(
    State(state): State<AppState>,
    TenantAuth(tenant_id): TenantAuth,
    Path(session_id): Path<String>,
    Json(body): Json<ContextRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let params = ContextParams {
        max_tokens: body.max_tokens,
        system_prompt: body.system_prompt,
        window_size: body.window_size,
        include_session_summary: body.include_session_summary,
    };
    let window = state.context_builder.build(&tenant_id, &sid, &params).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(
        serde_json::json!({
            "messages": window,
            "estimated_tokens": estimate_total(&window),
            "max_tokens": params.max_tokens,
        }),
        request_id,
        elapsed,
    )
    .with_link("session", &format!("/api/v1/sessions/{}", session_id));

    Ok(Json(resp))
}
