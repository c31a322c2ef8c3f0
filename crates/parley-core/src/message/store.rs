//! Message store: the tenant-checked append pipeline.
//!
//! Every append first confirms the target session exists under the
//! caller's tenant -- a cross-tenant reference is indistinguishable from
//! a missing session. After a successful insert the session's
//! last-activity timestamp is updated through the lifecycle manager.

use chrono::{DateTime, Utc};
use parley_types::error::ConversationError;
use parley_types::message::{Message, MessageDraft, MessageStatus, MessageType};
use parley_types::session::Session;
use tracing::info;
use uuid::Uuid;

use crate::message::repository::{
    MessageFilter, MessageRepository, MessageStatistics, SearchFilter,
};
use crate::session::{SessionLifecycle, SessionRepository};

/// Append-only, tenant-scoped message log over a session store.
pub struct MessageStore<M: MessageRepository, S: SessionRepository> {
    repo: M,
    lifecycle: SessionLifecycle<S>,
}

impl<M: MessageRepository, S: SessionRepository> MessageStore<M, S> {
    pub fn new(repo: M, lifecycle: SessionLifecycle<S>) -> Self {
        Self { repo, lifecycle }
    }

    /// Append a message to a session owned by `tenant_id`.
    ///
    /// Fails with `NotFound` when the session is absent or owned by a
    /// different tenant. Assigns the event timestamp when the draft
    /// omits one, persists, and updates the session's `last_message_at`.
    pub async fn append(
        &self,
        tenant_id: &Uuid,
        session_id: &Uuid,
        draft: MessageDraft,
    ) -> Result<Message, ConversationError> {
        // Ownership check and append must agree on the same tenant scope;
        // the insert below is keyed by tenant as well, so a mismatch can
        // never slip through between the two steps.
        self.lifecycle.get(session_id, tenant_id).await?;

        if draft.content.is_empty() {
            return Err(ConversationError::Validation(
                "message content is empty".into(),
            ));
        }
        if draft.sender_id.is_empty() {
            return Err(ConversationError::Validation("sender_id is empty".into()));
        }

        let now = Utc::now();
        let timestamp = draft.timestamp.unwrap_or(now);

        let message = self
            .repo
            .insert(tenant_id, session_id, &draft, timestamp, now)
            .await?;

        self.lifecycle
            .touch_last_message(session_id, tenant_id)
            .await?;

        info!(
            message_id = message.id,
            session_id = %session_id,
            tenant_id = %tenant_id,
            message_type = %message.message_type,
            sender_type = %message.sender_type,
            "message stored"
        );

        Ok(message)
    }

    /// List a session's messages, newest first.
    ///
    /// Verifies session ownership before touching the log, so a
    /// wrong-tenant session id fails with `NotFound` rather than
    /// returning an empty page.
    pub async fn list_by_session(
        &self,
        tenant_id: &Uuid,
        session_id: &Uuid,
        filter: &MessageFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, ConversationError> {
        self.lifecycle.get(session_id, tenant_id).await?;
        Ok(self
            .repo
            .list_by_session(tenant_id, session_id, filter, limit, offset)
            .await?)
    }

    /// Tenant-wide substring search over message content.
    pub async fn search(
        &self,
        tenant_id: &Uuid,
        query: &str,
        filter: &SearchFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, ConversationError> {
        Ok(self
            .repo
            .search(tenant_id, query, filter, limit, offset)
            .await?)
    }

    /// Update a message's delivery status.
    ///
    /// Status only moves forward (`sent -> delivered -> read`, `failed`
    /// from `sent`); a same-state update is an idempotent no-op that
    /// skips the write.
    pub async fn update_status(
        &self,
        tenant_id: &Uuid,
        message_id: i64,
        new_status: MessageStatus,
    ) -> Result<Message, ConversationError> {
        let mut message = self
            .repo
            .get(tenant_id, message_id)
            .await?
            .ok_or(ConversationError::NotFound)?;

        if !message.status.can_advance_to(new_status) {
            return Err(ConversationError::InvalidStatusChange {
                from: message.status,
                to: new_status,
            });
        }

        if message.status != new_status {
            self.repo
                .update_status(tenant_id, message_id, new_status)
                .await?;
            message.status = new_status;
            info!(
                message_id,
                tenant_id = %tenant_id,
                status = %new_status,
                "message status updated"
            );
        }

        Ok(message)
    }

    /// Count messages in a session.
    pub async fn count_by_session(
        &self,
        tenant_id: &Uuid,
        session_id: &Uuid,
    ) -> Result<u64, ConversationError> {
        self.lifecycle.get(session_id, tenant_id).await?;
        Ok(self.repo.count_by_session(tenant_id, session_id).await?)
    }

    /// Aggregate message counts for a tenant.
    pub async fn statistics(
        &self,
        tenant_id: &Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<MessageStatistics, ConversationError> {
        Ok(self.repo.statistics(tenant_id, start, end).await?)
    }

    /// Webhook-facing entry point: create-or-get the user's open session,
    /// then append the inbound message to it.
    pub async fn ingest(
        &self,
        tenant_id: &Uuid,
        user_id: &str,
        platform: &str,
        content: String,
        message_type: MessageType,
    ) -> Result<(Session, Message), ConversationError> {
        let session = self
            .lifecycle
            .create_or_get_open(tenant_id, user_id, platform, None)
            .await?;

        let draft = MessageDraft::user(user_id, content).with_message_type(message_type);
        let message = self.append(tenant_id, &session.id, draft).await?;

        Ok((session, message))
    }

    /// Access the lifecycle manager this store appends through.
    pub fn lifecycle(&self) -> &SessionLifecycle<S> {
        &self.lifecycle
    }
}
