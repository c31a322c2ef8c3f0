//! SessionRepository trait definition.
//!
//! Every operation is tenant-scoped: a session fetched with the wrong
//! tenant id behaves exactly like a missing session. Implementations
//! live in parley-infra (e.g., `SqliteSessionRepository`).

use chrono::{DateTime, Utc};
use parley_types::error::RepositoryError;
use parley_types::session::{Session, SessionStatus};
use uuid::Uuid;

/// Optional filters for session listing.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub assigned_staff_id: Option<Uuid>,
    pub platform: Option<String>,
}

/// Repository trait for session persistence.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait SessionRepository: Send + Sync {
    /// Insert a new session.
    ///
    /// The store enforces at most one open (waiting/active) session per
    /// `(tenant_id, user_id, platform)`; inserting a second one fails
    /// with `RepositoryError::Conflict` so the caller can fetch the
    /// winner instead.
    fn insert(
        &self,
        session: &Session,
    ) -> impl std::future::Future<Output = Result<Session, RepositoryError>> + Send;

    /// Get a session by `(id, tenant_id)`. Wrong tenant reads as absent.
    fn get(
        &self,
        id: &Uuid,
        tenant_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Session>, RepositoryError>> + Send;

    /// Find the newest open (waiting/active) session for a user on a platform.
    fn find_open(
        &self,
        tenant_id: &Uuid,
        user_id: &str,
        platform: &str,
    ) -> impl std::future::Future<Output = Result<Option<Session>, RepositoryError>> + Send;

    /// Persist changes to an existing session.
    ///
    /// Fails with `RepositoryError::NotFound` when no row matches the
    /// session's `(id, tenant_id)` pair.
    fn update(
        &self,
        session: &Session,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update `last_message_at` (and `updated_at`) for a session.
    ///
    /// Returns whether a row was touched.
    fn touch_last_message(
        &self,
        id: &Uuid,
        tenant_id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// List sessions for a tenant, most recently active first.
    fn list(
        &self,
        tenant_id: &Uuid,
        filter: &SessionFilter,
        limit: i64,
        offset: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Session>, RepositoryError>> + Send;
}
