//! SQLite session repository implementation.
//!
//! Implements `SessionRepository` from `parley-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, tenant scoping on
//! every statement. The at-most-one-open-session invariant is enforced by
//! the partial unique index `uniq_open_session`; a losing insert surfaces
//! as `RepositoryError::Conflict`.

use chrono::{DateTime, Utc};
use parley_core::session::repository::{SessionFilter, SessionRepository};
use parley_types::error::RepositoryError;
use parley_types::session::{ExtraData, Session, SessionStatus};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `SessionRepository`.
#[derive(Clone)]
pub struct SqliteSessionRepository {
    pool: DatabasePool,
}

impl SqliteSessionRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct SessionRow {
    id: String,
    tenant_id: String,
    user_id: String,
    platform: String,
    status: String,
    assigned_staff_id: Option<String>,
    priority: i64,
    extra_data: String,
    created_at: String,
    updated_at: String,
    last_message_at: Option<String>,
    closed_at: Option<String>,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            user_id: row.try_get("user_id")?,
            platform: row.try_get("platform")?,
            status: row.try_get("status")?,
            assigned_staff_id: row.try_get("assigned_staff_id")?,
            priority: row.try_get("priority")?,
            extra_data: row.try_get("extra_data")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            last_message_at: row.try_get("last_message_at")?,
            closed_at: row.try_get("closed_at")?,
        })
    }

    fn into_session(self) -> Result<Session, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid session id: {e}")))?;
        let tenant_id = Uuid::parse_str(&self.tenant_id)
            .map_err(|e| RepositoryError::Query(format!("invalid tenant_id: {e}")))?;
        let assigned_staff_id = self
            .assigned_staff_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid assigned_staff_id: {e}")))?;
        let status: SessionStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let extra_data: ExtraData = serde_json::from_str(&self.extra_data)
            .map_err(|e| RepositoryError::Query(format!("invalid extra_data: {e}")))?;
        let created_at = parse_datetime(&self.created_at)?;
        let updated_at = parse_datetime(&self.updated_at)?;
        let last_message_at = self
            .last_message_at
            .as_deref()
            .map(parse_datetime)
            .transpose()?;
        let closed_at = self.closed_at.as_deref().map(parse_datetime).transpose()?;

        Ok(Session {
            id,
            tenant_id,
            user_id: self.user_id,
            platform: self.platform,
            status,
            assigned_staff_id,
            priority: self.priority as u8,
            extra_data,
            created_at,
            updated_at,
            last_message_at,
            closed_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn encode_extra_data(extra: &ExtraData) -> Result<String, RepositoryError> {
    serde_json::to_string(extra)
        .map_err(|e| RepositoryError::Query(format!("failed to encode extra_data: {e}")))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ---------------------------------------------------------------------------
// SessionRepository implementation
// ---------------------------------------------------------------------------

impl SessionRepository for SqliteSessionRepository {
    async fn insert(&self, session: &Session) -> Result<Session, RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO sessions (id, tenant_id, user_id, platform, status, assigned_staff_id, priority, extra_data, created_at, updated_at, last_message_at, closed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session.id.to_string())
        .bind(session.tenant_id.to_string())
        .bind(&session.user_id)
        .bind(&session.platform)
        .bind(session.status.to_string())
        .bind(session.assigned_staff_id.map(|id| id.to_string()))
        .bind(i64::from(session.priority))
        .bind(encode_extra_data(&session.extra_data)?)
        .bind(format_datetime(&session.created_at))
        .bind(format_datetime(&session.updated_at))
        .bind(session.last_message_at.as_ref().map(format_datetime))
        .bind(session.closed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(session.clone()),
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(
                    tenant_id = %session.tenant_id,
                    user_id = %session.user_id,
                    platform = %session.platform,
                    "insert hit the open-session unique index"
                );
                Err(RepositoryError::Conflict(format!(
                    "open session exists for {}/{}",
                    session.user_id, session.platform
                )))
            }
            Err(e) => Err(RepositoryError::Query(e.to_string())),
        }
    }

    async fn get(&self, id: &Uuid, tenant_id: &Uuid) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ? AND tenant_id = ?")
            .bind(id.to_string())
            .bind(tenant_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row =
                    SessionRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn find_open(
        &self,
        tenant_id: &Uuid,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT * FROM sessions
               WHERE tenant_id = ? AND user_id = ? AND platform = ?
                 AND status IN ('waiting', 'active')
               ORDER BY created_at DESC
               LIMIT 1"#,
        )
        .bind(tenant_id.to_string())
        .bind(user_id)
        .bind(platform)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row =
                    SessionRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, session: &Session) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE sessions
               SET status = ?, assigned_staff_id = ?, priority = ?, extra_data = ?,
                   updated_at = ?, last_message_at = ?, closed_at = ?
               WHERE id = ? AND tenant_id = ?"#,
        )
        .bind(session.status.to_string())
        .bind(session.assigned_staff_id.map(|id| id.to_string()))
        .bind(i64::from(session.priority))
        .bind(encode_extra_data(&session.extra_data)?)
        .bind(format_datetime(&session.updated_at))
        .bind(session.last_message_at.as_ref().map(format_datetime))
        .bind(session.closed_at.as_ref().map(format_datetime))
        .bind(session.id.to_string())
        .bind(session.tenant_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn touch_last_message(
        &self,
        id: &Uuid,
        tenant_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE sessions SET last_message_at = ?, updated_at = ? WHERE id = ? AND tenant_id = ?",
        )
        .bind(format_datetime(&at))
        .bind(format_datetime(&at))
        .bind(id.to_string())
        .bind(tenant_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(
        &self,
        tenant_id: &Uuid,
        filter: &SessionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Session>, RepositoryError> {
        let mut sql = String::from("SELECT * FROM sessions WHERE tenant_id = ?");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.assigned_staff_id.is_some() {
            sql.push_str(" AND assigned_staff_id = ?");
        }
        if filter.platform.is_some() {
            sql.push_str(" AND platform = ?");
        }
        sql.push_str(" ORDER BY COALESCE(last_message_at, created_at) DESC");
        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));

        let mut query = sqlx::query(&sql).bind(tenant_id.to_string());
        if let Some(status) = filter.status {
            query = query.bind(status.to_string());
        }
        if let Some(staff_id) = filter.assigned_staff_id {
            query = query.bind(staff_id.to_string());
        }
        if let Some(platform) = &filter.platform {
            query = query.bind(platform.clone());
        }

        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_row =
                SessionRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            sessions.push(session_row.into_session()?);
        }

        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn make_session(tenant_id: Uuid, user_id: &str) -> Session {
        Session::new(tenant_id, user_id, "webchat")
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let pool = test_pool().await;
        let repo = SqliteSessionRepository::new(pool);
        let tenant = Uuid::now_v7();

        let session = make_session(tenant, "webchat:alice");
        let created = repo.insert(&session).await.unwrap();
        assert_eq!(created.id, session.id);

        let found = repo.get(&session.id, &tenant).await.unwrap().unwrap();
        assert_eq!(found.id, session.id);
        assert_eq!(found.user_id, "webchat:alice");
        assert_eq!(found.status, SessionStatus::Waiting);
        assert_eq!(found.priority, 5);
    }

    #[tokio::test]
    async fn test_get_with_wrong_tenant_returns_none() {
        let pool = test_pool().await;
        let repo = SqliteSessionRepository::new(pool);
        let tenant = Uuid::now_v7();

        let session = make_session(tenant, "webchat:alice");
        repo.insert(&session).await.unwrap();

        let found = repo.get(&session.id, &Uuid::now_v7()).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_second_open_insert_conflicts() {
        let pool = test_pool().await;
        let repo = SqliteSessionRepository::new(pool);
        let tenant = Uuid::now_v7();

        repo.insert(&make_session(tenant, "webchat:alice"))
            .await
            .unwrap();

        let err = repo
            .insert(&make_session(tenant, "webchat:alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        // A different user, or the same user for another tenant, is fine.
        repo.insert(&make_session(tenant, "webchat:bob"))
            .await
            .unwrap();
        repo.insert(&make_session(Uuid::now_v7(), "webchat:alice"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_session_frees_the_open_slot() {
        let pool = test_pool().await;
        let repo = SqliteSessionRepository::new(pool);
        let tenant = Uuid::now_v7();

        let mut session = make_session(tenant, "webchat:alice");
        repo.insert(&session).await.unwrap();

        session.status = SessionStatus::Closed;
        session.closed_at = Some(Utc::now());
        repo.update(&session).await.unwrap();

        // The partial unique index no longer covers the closed row.
        repo.insert(&make_session(tenant, "webchat:alice"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_open_returns_newest() {
        let pool = test_pool().await;
        let repo = SqliteSessionRepository::new(pool);
        let tenant = Uuid::now_v7();

        assert!(repo
            .find_open(&tenant, "webchat:alice", "webchat")
            .await
            .unwrap()
            .is_none());

        let session = make_session(tenant, "webchat:alice");
        repo.insert(&session).await.unwrap();

        let found = repo
            .find_open(&tenant, "webchat:alice", "webchat")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, session.id);

        // Platform is part of the key.
        assert!(repo
            .find_open(&tenant, "webchat:alice", "telegram")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_roundtrips_fields() {
        let pool = test_pool().await;
        let repo = SqliteSessionRepository::new(pool);
        let tenant = Uuid::now_v7();

        let mut session = make_session(tenant, "webchat:alice");
        repo.insert(&session).await.unwrap();

        let staff = Uuid::now_v7();
        session.status = SessionStatus::Active;
        session.assigned_staff_id = Some(staff);
        session.extra_data.set("status_change_reason", "assigned");
        session.updated_at = Utc::now();
        repo.update(&session).await.unwrap();

        let found = repo.get(&session.id, &tenant).await.unwrap().unwrap();
        assert_eq!(found.status, SessionStatus::Active);
        assert_eq!(found.assigned_staff_id, Some(staff));
        assert_eq!(
            found.extra_data.get("status_change_reason").unwrap(),
            "assigned"
        );
    }

    #[tokio::test]
    async fn test_update_with_wrong_tenant_is_not_found() {
        let pool = test_pool().await;
        let repo = SqliteSessionRepository::new(pool);
        let tenant = Uuid::now_v7();

        let mut session = make_session(tenant, "webchat:alice");
        repo.insert(&session).await.unwrap();

        session.tenant_id = Uuid::now_v7();
        session.status = SessionStatus::Active;
        let err = repo.update(&session).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_touch_last_message() {
        let pool = test_pool().await;
        let repo = SqliteSessionRepository::new(pool);
        let tenant = Uuid::now_v7();

        let session = make_session(tenant, "webchat:alice");
        repo.insert(&session).await.unwrap();

        let at = Utc::now();
        assert!(repo.touch_last_message(&session.id, &tenant, at).await.unwrap());
        let found = repo.get(&session.id, &tenant).await.unwrap().unwrap();
        assert!(found.last_message_at.is_some());

        // Wrong tenant touches nothing.
        assert!(!repo
            .touch_last_message(&session.id, &Uuid::now_v7(), at)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let pool = test_pool().await;
        let repo = SqliteSessionRepository::new(pool);
        let tenant = Uuid::now_v7();
        let staff = Uuid::now_v7();

        for i in 0..3 {
            let mut session = make_session(tenant, &format!("webchat:user{i}"));
            if i == 0 {
                session.status = SessionStatus::Active;
                session.assigned_staff_id = Some(staff);
            }
            repo.insert(&session).await.unwrap();
        }
        // Another tenant's session never shows up.
        repo.insert(&make_session(Uuid::now_v7(), "webchat:other"))
            .await
            .unwrap();

        let all = repo
            .list(&tenant, &SessionFilter::default(), 50, 0)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let filter = SessionFilter {
            status: Some(SessionStatus::Active),
            ..Default::default()
        };
        let active = repo.list(&tenant, &filter, 50, 0).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].assigned_staff_id, Some(staff));

        let filter = SessionFilter {
            assigned_staff_id: Some(staff),
            ..Default::default()
        };
        let assigned = repo.list(&tenant, &filter, 50, 0).await.unwrap();
        assert_eq!(assigned.len(), 1);

        let page = repo
            .list(&tenant, &SessionFilter::default(), 2, 0)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
    }
}
