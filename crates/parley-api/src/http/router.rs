//! Axum router configuration with middleware.
//!
//! All REST routes are under `/api/v1/`; the WebSocket endpoint lives at
//! `/ws/connect`. Middleware: CORS and request tracing.

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Sessions
        .route("/sessions", post(handlers::session::create_or_get_session))
        .route("/sessions", get(handlers::session::list_sessions))
        .route("/sessions/{id}", get(handlers::session::get_session))
        .route(
            "/sessions/{id}/status",
            put(handlers::session::update_session_status),
        )
        .route(
            "/sessions/{id}/messages",
            get(handlers::session::get_messages),
        )
        // Context windows for AI callers
        .route(
            "/sessions/{id}/context",
            post(handlers::context::build_context),
        )
        // Messages
        .route("/messages/search", get(handlers::message::search_messages))
        .route(
            "/messages/{id}/status",
            put(handlers::message::update_message_status),
        )
        .route(
            "/messages/statistics",
            get(handlers::message::get_statistics),
        )
        // Webhook ingestion
        .route("/webhooks/messages", post(handlers::webhook::receive_message));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws/connect", get(handlers::ws::ws_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint (no auth required).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
