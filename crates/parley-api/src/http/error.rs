//! Application error type mapping to HTTP status codes and envelope format.
//!
//! Domain errors travel up the call chain as typed values; this is the
//! only place they become transport responses. A cross-tenant lookup and
//! a genuinely missing entity produce byte-identical 404 bodies.

use axum::response::{IntoResponse, Response};

use parley_types::error::ConversationError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Session/message domain errors.
    Conversation(ConversationError),
    /// Authentication failure.
    Unauthorized(String),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<ConversationError> for AppError {
    fn from(e: ConversationError) -> Self {
        AppError::Conversation(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, message) = match &self {
            AppError::Conversation(ConversationError::NotFound) => {
                ("NOT_FOUND", "Not found".to_string())
            }
            AppError::Conversation(err @ ConversationError::InvalidStateTransition { .. }) => {
                ("INVALID_STATE_TRANSITION", err.to_string())
            }
            AppError::Conversation(err @ ConversationError::InvalidStatusChange { .. }) => {
                ("INVALID_STATUS_CHANGE", err.to_string())
            }
            AppError::Conversation(ConversationError::Validation(msg)) => {
                ("VALIDATION_ERROR", msg.clone())
            }
            AppError::Conversation(ConversationError::Storage(msg)) => {
                ("STORAGE_ERROR", msg.clone())
            }
            AppError::Unauthorized(msg) => ("UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => ("VALIDATION_ERROR", msg.clone()),
            AppError::Internal(msg) => ("INTERNAL_ERROR", msg.clone()),
        };

        ApiResponse::error(code, &message, String::new(), 0).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use parley_types::session::SessionStatus;

    #[test]
    fn test_not_found_hides_tenant_mismatch() {
        // Both a missing id and another tenant's id take the
        // ConversationError::NotFound path -- one body, one status.
        let resp = AppError::Conversation(ConversationError::NotFound).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_transition_is_bad_request() {
        let resp = AppError::Conversation(ConversationError::InvalidStateTransition {
            from: SessionStatus::Closed,
            to: SessionStatus::Active,
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unauthorized_maps_to_401() {
        let resp = AppError::Unauthorized("bad key".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
