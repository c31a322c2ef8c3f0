//! Session lifecycle manager.
//!
//! Owns session entities and enforces the status state machine. The
//! create-or-get operation is idempotent: repeated calls for the same
//! `(tenant_id, user_id, platform)` return the same open session. The
//! read-then-insert race between concurrent callers is closed by the
//! store's unique open-session constraint: a losing insert surfaces as a
//! conflict and resolves by fetching the winner.

use chrono::Utc;
use parley_types::error::{ConversationError, RepositoryError};
use parley_types::session::{ExtraData, Session, SessionStatus};
use tracing::{info, warn};
use uuid::Uuid;

use crate::session::repository::{SessionFilter, SessionRepository};

/// Key under which a status-change reason is recorded in `extra_data`.
const STATUS_CHANGE_REASON_KEY: &str = "status_change_reason";

/// Manages session creation, status transitions, and activity bookkeeping.
pub struct SessionLifecycle<R: SessionRepository> {
    repo: R,
}

impl<R: SessionRepository + Clone> Clone for SessionLifecycle<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
        }
    }
}

impl<R: SessionRepository> SessionLifecycle<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Return the user's open session, creating a WAITING one if none exists.
    ///
    /// Idempotent: with no intervening status change, two calls return
    /// the same session. `extras` is merged into `extra_data` only when a
    /// new session is created; an existing session is returned unchanged.
    pub async fn create_or_get_open(
        &self,
        tenant_id: &Uuid,
        user_id: &str,
        platform: &str,
        extras: Option<ExtraData>,
    ) -> Result<Session, ConversationError> {
        if user_id.is_empty() {
            return Err(ConversationError::Validation("user_id is empty".into()));
        }
        if platform.is_empty() {
            return Err(ConversationError::Validation("platform is empty".into()));
        }

        // Two rounds cover the create race: a conflicting insert means
        // another caller won between our lookup and our insert, so the
        // next lookup finds their session (or, if it already closed
        // again, the next insert succeeds).
        for _ in 0..2 {
            if let Some(existing) = self.repo.find_open(tenant_id, user_id, platform).await? {
                info!(
                    session_id = %existing.id,
                    tenant_id = %tenant_id,
                    user_id,
                    "returning existing open session"
                );
                return Ok(existing);
            }

            let mut session = Session::new(*tenant_id, user_id, platform);
            if let Some(extras) = extras.clone() {
                session.extra_data.merge(extras);
            }

            match self.repo.insert(&session).await {
                Ok(created) => {
                    info!(
                        session_id = %created.id,
                        tenant_id = %tenant_id,
                        user_id,
                        platform,
                        "session created"
                    );
                    return Ok(created);
                }
                Err(RepositoryError::Conflict(_)) => {
                    warn!(
                        tenant_id = %tenant_id,
                        user_id,
                        platform,
                        "open session already created concurrently, fetching it"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ConversationError::Storage(
            "could not create or fetch an open session".into(),
        ))
    }

    /// Get a session by id. A wrong-tenant lookup is `NotFound`.
    pub async fn get(
        &self,
        session_id: &Uuid,
        tenant_id: &Uuid,
    ) -> Result<Session, ConversationError> {
        self.repo
            .get(session_id, tenant_id)
            .await?
            .ok_or(ConversationError::NotFound)
    }

    /// Apply a validated status transition.
    ///
    /// Side effects: a transition into ACTIVE with `assigned_staff_id`
    /// records the assignment; CLOSED stamps `closed_at`; a `reason` is
    /// recorded into `extra_data`.
    pub async fn update_status(
        &self,
        session_id: &Uuid,
        tenant_id: &Uuid,
        new_status: SessionStatus,
        assigned_staff_id: Option<Uuid>,
        reason: Option<String>,
    ) -> Result<Session, ConversationError> {
        let mut session = self.get(session_id, tenant_id).await?;
        let old_status = session.status;

        if !old_status.can_transition_to(new_status) {
            return Err(ConversationError::InvalidStateTransition {
                from: old_status,
                to: new_status,
            });
        }

        session.status = new_status;
        session.updated_at = Utc::now();

        if new_status == SessionStatus::Active {
            if let Some(staff_id) = assigned_staff_id {
                session.assigned_staff_id = Some(staff_id);
            }
        }

        if new_status == SessionStatus::Closed {
            session.closed_at = Some(Utc::now());
        }

        if let Some(reason) = reason {
            session.extra_data.set(STATUS_CHANGE_REASON_KEY, reason);
        }

        self.repo.update(&session).await?;

        info!(
            session_id = %session_id,
            tenant_id = %tenant_id,
            old_status = %old_status,
            new_status = %new_status,
            "session status updated"
        );

        Ok(session)
    }

    /// Record message activity on a session.
    ///
    /// Called by the message append pipeline after a successful insert.
    pub async fn touch_last_message(
        &self,
        session_id: &Uuid,
        tenant_id: &Uuid,
    ) -> Result<(), ConversationError> {
        let touched = self
            .repo
            .touch_last_message(session_id, tenant_id, Utc::now())
            .await?;
        if !touched {
            return Err(ConversationError::NotFound);
        }
        Ok(())
    }

    /// List sessions for a tenant, most recently active first.
    pub async fn list(
        &self,
        tenant_id: &Uuid,
        filter: &SessionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Session>, ConversationError> {
        Ok(self.repo.list(tenant_id, filter, limit, offset).await?)
    }

    /// Transition hook for the external expiry job: mark a non-terminal
    /// session TIMEOUT.
    ///
    /// TIMEOUT is never a valid target of `update_status`; this is the
    /// only producer inside the subsystem, and the triggering policy
    /// (when a session counts as stale) lives outside it.
    pub async fn expire(
        &self,
        session_id: &Uuid,
        tenant_id: &Uuid,
    ) -> Result<Session, ConversationError> {
        let mut session = self.get(session_id, tenant_id).await?;

        if session.status.is_terminal() {
            return Err(ConversationError::InvalidStateTransition {
                from: session.status,
                to: SessionStatus::Timeout,
            });
        }

        session.status = SessionStatus::Timeout;
        session.closed_at = Some(Utc::now());
        session.updated_at = Utc::now();
        session
            .extra_data
            .set(STATUS_CHANGE_REASON_KEY, "timeout");

        self.repo.update(&session).await?;

        info!(session_id = %session_id, tenant_id = %tenant_id, "session expired");

        Ok(session)
    }
}
