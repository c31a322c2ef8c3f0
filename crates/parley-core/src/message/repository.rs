//! MessageRepository trait definition.
//!
//! The message log is append-only: stored rows are immutable except for
//! their delivery status. Ids are assigned by the store and increase
//! monotonically within a tenant. Implementations live in parley-infra
//! (e.g., `SqliteMessageRepository`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parley_types::error::RepositoryError;
use parley_types::message::{Message, MessageDraft, MessageStatus, MessageType};
use serde::Serialize;
use uuid::Uuid;

/// Filters for listing messages within a session.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub message_type: Option<MessageType>,
    /// Only messages with `timestamp` strictly before this instant.
    pub before: Option<DateTime<Utc>>,
    /// Only messages with `timestamp` strictly after this instant.
    pub after: Option<DateTime<Utc>>,
}

/// Filters for tenant-wide content search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub session_id: Option<Uuid>,
    pub sender_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Aggregate message counts for a tenant over an optional time range.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageStatistics {
    pub total: u64,
    pub by_message_type: HashMap<String, u64>,
    pub by_sender_type: HashMap<String, u64>,
}

/// Repository trait for message persistence.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait MessageRepository: Send + Sync {
    /// Persist a draft and return the stored, fully-populated message.
    ///
    /// The store assigns the sequence id; `timestamp` is the resolved
    /// event time and `created_at` the storage time.
    fn insert(
        &self,
        tenant_id: &Uuid,
        session_id: &Uuid,
        draft: &MessageDraft,
        timestamp: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Message, RepositoryError>> + Send;

    /// Get a message by `(tenant_id, id)`. Wrong tenant reads as absent.
    fn get(
        &self,
        tenant_id: &Uuid,
        message_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Message>, RepositoryError>> + Send;

    /// List messages for a session, newest first (`timestamp` desc, id
    /// desc as the tiebreak).
    fn list_by_session(
        &self,
        tenant_id: &Uuid,
        session_id: &Uuid,
        filter: &MessageFilter,
        limit: i64,
        offset: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    /// Substring search over message content, newest first.
    ///
    /// Plain substring match, not full-text ranking.
    fn search(
        &self,
        tenant_id: &Uuid,
        query: &str,
        filter: &SearchFilter,
        limit: i64,
        offset: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    /// Overwrite a message's delivery status.
    ///
    /// Fails with `RepositoryError::NotFound` when no row matches the
    /// `(tenant_id, id)` pair. Transition validation is the store
    /// service's job, not the repository's.
    fn update_status(
        &self,
        tenant_id: &Uuid,
        message_id: i64,
        status: MessageStatus,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Count messages in a session.
    fn count_by_session(
        &self,
        tenant_id: &Uuid,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Aggregate counts by message type and sender type.
    fn statistics(
        &self,
        tenant_id: &Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> impl std::future::Future<Output = Result<MessageStatistics, RepositoryError>> + Send;
}
