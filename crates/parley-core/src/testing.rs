//! In-memory repository implementations for service-level tests.
//!
//! These mirror the SQLite repositories' observable behavior, including
//! the unique open-session constraint and tenant scoping, so lifecycle,
//! store, and builder tests run without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use parley_types::error::RepositoryError;
use parley_types::message::{Message, MessageDraft, MessageStatus};
use parley_types::session::Session;
use uuid::Uuid;

use crate::message::repository::{
    MessageFilter, MessageRepository, MessageStatistics, SearchFilter,
};
use crate::session::repository::{SessionFilter, SessionRepository};

/// HashMap-backed `SessionRepository`.
#[derive(Clone, Default)]
pub struct MemorySessionRepository {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert bypassing the open-session constraint, for race setups.
    pub fn force_insert(&self, session: Session) {
        self.sessions.lock().unwrap().insert(session.id, session);
    }
}

impl SessionRepository for MemorySessionRepository {
    async fn insert(&self, session: &Session) -> Result<Session, RepositoryError> {
        let mut sessions = self.sessions.lock().unwrap();
        let open_exists = sessions.values().any(|s| {
            s.tenant_id == session.tenant_id
                && s.user_id == session.user_id
                && s.platform == session.platform
                && s.status.is_open()
        });
        if open_exists && session.status.is_open() {
            return Err(RepositoryError::Conflict(format!(
                "open session exists for {}/{}",
                session.user_id, session.platform
            )));
        }
        sessions.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn get(&self, id: &Uuid, tenant_id: &Uuid) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .get(id)
            .filter(|s| s.tenant_id == *tenant_id)
            .cloned())
    }

    async fn find_open(
        &self,
        tenant_id: &Uuid,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.lock().unwrap();
        let mut open: Vec<&Session> = sessions
            .values()
            .filter(|s| {
                s.tenant_id == *tenant_id
                    && s.user_id == user_id
                    && s.platform == platform
                    && s.status.is_open()
            })
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(open.first().map(|s| (*s).clone()))
    }

    async fn update(&self, session: &Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(&session.id) {
            Some(existing) if existing.tenant_id == session.tenant_id => {
                *existing = session.clone();
                Ok(())
            }
            _ => Err(RepositoryError::NotFound),
        }
    }

    async fn touch_last_message(
        &self,
        id: &Uuid,
        tenant_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(id) {
            Some(session) if session.tenant_id == *tenant_id => {
                session.last_message_at = Some(at);
                session.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(
        &self,
        tenant_id: &Uuid,
        filter: &SessionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Session>, RepositoryError> {
        let sessions = self.sessions.lock().unwrap();
        let mut matched: Vec<Session> = sessions
            .values()
            .filter(|s| s.tenant_id == *tenant_id)
            .filter(|s| filter.status.is_none_or(|status| s.status == status))
            .filter(|s| {
                filter
                    .assigned_staff_id
                    .is_none_or(|staff| s.assigned_staff_id == Some(staff))
            })
            .filter(|s| {
                filter
                    .platform
                    .as_deref()
                    .is_none_or(|platform| s.platform == platform)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            let a_key = a.last_message_at.unwrap_or(a.created_at);
            let b_key = b.last_message_at.unwrap_or(b.created_at);
            b_key.cmp(&a_key)
        });
        Ok(matched
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

/// Vec-backed `MessageRepository` with an atomic id sequence.
#[derive(Clone, Default)]
pub struct MemoryMessageRepository {
    messages: Arc<Mutex<Vec<Message>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryMessageRepository {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }
}

impl MessageRepository for MemoryMessageRepository {
    async fn insert(
        &self,
        tenant_id: &Uuid,
        session_id: &Uuid,
        draft: &MessageDraft,
        timestamp: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<Message, RepositoryError> {
        let message = Message {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            tenant_id: *tenant_id,
            session_id: *session_id,
            content: draft.content.clone(),
            message_type: draft.message_type,
            sender_type: draft.sender_type,
            sender_id: draft.sender_id.clone(),
            timestamp,
            created_at,
            attachments: draft.attachments.clone(),
            status: MessageStatus::Sent,
        };
        self.messages.lock().unwrap().push(message.clone());
        Ok(message)
    }

    async fn get(
        &self,
        tenant_id: &Uuid,
        message_id: i64,
    ) -> Result<Option<Message>, RepositoryError> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .iter()
            .find(|m| m.id == message_id && m.tenant_id == *tenant_id)
            .cloned())
    }

    async fn list_by_session(
        &self,
        tenant_id: &Uuid,
        session_id: &Uuid,
        filter: &MessageFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.lock().unwrap();
        let mut matched: Vec<Message> = messages
            .iter()
            .filter(|m| m.tenant_id == *tenant_id && m.session_id == *session_id)
            .filter(|m| filter.message_type.is_none_or(|t| m.message_type == t))
            .filter(|m| filter.before.is_none_or(|t| m.timestamp < t))
            .filter(|m| filter.after.is_none_or(|t| m.timestamp > t))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(matched
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn search(
        &self,
        tenant_id: &Uuid,
        query: &str,
        filter: &SearchFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.lock().unwrap();
        let mut matched: Vec<Message> = messages
            .iter()
            .filter(|m| m.tenant_id == *tenant_id)
            .filter(|m| m.content.contains(query))
            .filter(|m| filter.session_id.is_none_or(|s| m.session_id == s))
            .filter(|m| {
                filter
                    .sender_id
                    .as_deref()
                    .is_none_or(|sender| m.sender_id == sender)
            })
            .filter(|m| filter.start.is_none_or(|t| m.timestamp >= t))
            .filter(|m| filter.end.is_none_or(|t| m.timestamp <= t))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(matched
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_status(
        &self,
        tenant_id: &Uuid,
        message_id: i64,
        status: MessageStatus,
    ) -> Result<(), RepositoryError> {
        let mut messages = self.messages.lock().unwrap();
        match messages
            .iter_mut()
            .find(|m| m.id == message_id && m.tenant_id == *tenant_id)
        {
            Some(message) => {
                message.status = status;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn count_by_session(
        &self,
        tenant_id: &Uuid,
        session_id: &Uuid,
    ) -> Result<u64, RepositoryError> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .iter()
            .filter(|m| m.tenant_id == *tenant_id && m.session_id == *session_id)
            .count() as u64)
    }

    async fn statistics(
        &self,
        tenant_id: &Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<MessageStatistics, RepositoryError> {
        let messages = self.messages.lock().unwrap();
        let mut stats = MessageStatistics::default();
        for m in messages
            .iter()
            .filter(|m| m.tenant_id == *tenant_id)
            .filter(|m| start.is_none_or(|t| m.created_at >= t))
            .filter(|m| end.is_none_or(|t| m.created_at <= t))
        {
            stats.total += 1;
            *stats
                .by_message_type
                .entry(m.message_type.to_string())
                .or_insert(0) += 1;
            *stats
                .by_sender_type
                .entry(m.sender_type.to_string())
                .or_insert(0) += 1;
        }
        Ok(stats)
    }
}
