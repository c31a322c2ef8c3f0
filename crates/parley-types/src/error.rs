use thiserror::Error;

use crate::message::MessageStatus;
use crate::session::SessionStatus;

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by session and message operations.
///
/// `NotFound` deliberately covers both "no such entity" and "entity owned
/// by another tenant" -- callers must not be able to tell them apart.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("not found")]
    NotFound,

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("invalid message status change: {from} -> {to}")]
    InvalidStatusChange {
        from: MessageStatus,
        to: MessageStatus,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<RepositoryError> for ConversationError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => ConversationError::NotFound,
            other => ConversationError::Storage(other.to_string()),
        }
    }
}

/// Failure delivering a payload to a single live connection.
///
/// Always handled locally by the broadcaster (the offending connection is
/// pruned); never surfaced to the sender of a broadcast.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("send deadline exceeded")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_error_display() {
        let err = ConversationError::InvalidStateTransition {
            from: SessionStatus::Closed,
            to: SessionStatus::Active,
        };
        assert_eq!(err.to_string(), "invalid state transition: closed -> active");
    }

    #[test]
    fn test_repository_not_found_maps_to_not_found() {
        let err: ConversationError = RepositoryError::NotFound.into();
        assert!(matches!(err, ConversationError::NotFound));
    }

    #[test]
    fn test_repository_query_maps_to_storage() {
        let err: ConversationError = RepositoryError::Query("syntax error".to_string()).into();
        assert!(matches!(err, ConversationError::Storage(_)));
        assert!(err.to_string().contains("syntax error"));
    }
}
