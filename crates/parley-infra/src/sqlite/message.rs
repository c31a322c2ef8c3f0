//! SQLite message repository implementation.
//!
//! Implements `MessageRepository` from `parley-core` using sqlx with split
//! read/write pools. The message log is append-only; ids come from the
//! table's AUTOINCREMENT sequence, which is monotonic within (and across)
//! tenants. Search is a plain `LIKE` substring match with `%`/`_` escaping.

use chrono::{DateTime, Utc};
use parley_core::message::repository::{
    MessageFilter, MessageRepository, MessageStatistics, SearchFilter,
};
use parley_types::error::RepositoryError;
use parley_types::message::{
    Attachment, Message, MessageDraft, MessageStatus, MessageType, SenderType,
};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::session::{format_datetime, parse_datetime};

/// SQLite-backed implementation of `MessageRepository`.
#[derive(Clone)]
pub struct SqliteMessageRepository {
    pool: DatabasePool,
}

impl SqliteMessageRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct MessageRow {
    id: i64,
    tenant_id: String,
    session_id: String,
    content: String,
    message_type: String,
    sender_type: String,
    sender_id: String,
    timestamp: String,
    created_at: String,
    attachments: String,
    status: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            session_id: row.try_get("session_id")?,
            content: row.try_get("content")?,
            message_type: row.try_get("message_type")?,
            sender_type: row.try_get("sender_type")?,
            sender_id: row.try_get("sender_id")?,
            timestamp: row.try_get("timestamp")?,
            created_at: row.try_get("created_at")?,
            attachments: row.try_get("attachments")?,
            status: row.try_get("status")?,
        })
    }

    fn into_message(self) -> Result<Message, RepositoryError> {
        let tenant_id = Uuid::parse_str(&self.tenant_id)
            .map_err(|e| RepositoryError::Query(format!("invalid tenant_id: {e}")))?;
        let session_id = Uuid::parse_str(&self.session_id)
            .map_err(|e| RepositoryError::Query(format!("invalid session_id: {e}")))?;
        let message_type: MessageType = self
            .message_type
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let sender_type: SenderType = self
            .sender_type
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let status: MessageStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let attachments: Vec<Attachment> = serde_json::from_str(&self.attachments)
            .map_err(|e| RepositoryError::Query(format!("invalid attachments: {e}")))?;
        let timestamp = parse_datetime(&self.timestamp)?;
        let created_at = parse_datetime(&self.created_at)?;

        Ok(Message {
            id: self.id,
            tenant_id,
            session_id,
            content: self.content,
            message_type,
            sender_type,
            sender_id: self.sender_id,
            timestamp,
            created_at,
            attachments,
            status,
        })
    }
}

/// Escape `%`, `_`, and `\` for use inside a LIKE pattern.
fn escape_like(query: &str) -> String {
    query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// ---------------------------------------------------------------------------
// MessageRepository implementation
// ---------------------------------------------------------------------------

impl MessageRepository for SqliteMessageRepository {
    async fn insert(
        &self,
        tenant_id: &Uuid,
        session_id: &Uuid,
        draft: &MessageDraft,
        timestamp: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<Message, RepositoryError> {
        let attachments = serde_json::to_string(&draft.attachments)
            .map_err(|e| RepositoryError::Query(format!("failed to encode attachments: {e}")))?;

        let result = sqlx::query(
            r#"INSERT INTO messages (tenant_id, session_id, content, message_type, sender_type, sender_id, timestamp, created_at, attachments, status)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(tenant_id.to_string())
        .bind(session_id.to_string())
        .bind(&draft.content)
        .bind(draft.message_type.to_string())
        .bind(draft.sender_type.to_string())
        .bind(&draft.sender_id)
        .bind(format_datetime(&timestamp))
        .bind(format_datetime(&created_at))
        .bind(&attachments)
        .bind(MessageStatus::Sent.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(Message {
            id: result.last_insert_rowid(),
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
        })
    }

    async fn get(
        &self,
        tenant_id: &Uuid,
        message_id: i64,
    ) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ? AND tenant_id = ?")
            .bind(message_id)
            .bind(tenant_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let msg_row =
                    MessageRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(msg_row.into_message()?))
            }
            None => Ok(None),
        }
    }

    async fn list_by_session(
        &self,
        tenant_id: &Uuid,
        session_id: &Uuid,
        filter: &MessageFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut sql =
            String::from("SELECT * FROM messages WHERE tenant_id = ? AND session_id = ?");
        if filter.message_type.is_some() {
            sql.push_str(" AND message_type = ?");
        }
        if filter.before.is_some() {
            sql.push_str(" AND timestamp < ?");
        }
        if filter.after.is_some() {
            sql.push_str(" AND timestamp > ?");
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC");
        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));

        let mut query = sqlx::query(&sql)
            .bind(tenant_id.to_string())
            .bind(session_id.to_string());
        if let Some(message_type) = filter.message_type {
            query = query.bind(message_type.to_string());
        }
        if let Some(before) = &filter.before {
            query = query.bind(format_datetime(before));
        }
        if let Some(after) = &filter.after {
            query = query.bind(format_datetime(after));
        }

        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let msg_row =
                MessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(msg_row.into_message()?);
        }

        Ok(messages)
    }

    async fn search(
        &self,
        tenant_id: &Uuid,
        query: &str,
        filter: &SearchFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut sql = String::from(
            "SELECT * FROM messages WHERE tenant_id = ? AND content LIKE ? ESCAPE '\\'",
        );
        if filter.session_id.is_some() {
            sql.push_str(" AND session_id = ?");
        }
        if filter.sender_id.is_some() {
            sql.push_str(" AND sender_id = ?");
        }
        if filter.start.is_some() {
            sql.push_str(" AND timestamp >= ?");
        }
        if filter.end.is_some() {
            sql.push_str(" AND timestamp <= ?");
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC");
        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));

        let pattern = format!("%{}%", escape_like(query));
        let mut q = sqlx::query(&sql).bind(tenant_id.to_string()).bind(pattern);
        if let Some(session_id) = filter.session_id {
            q = q.bind(session_id.to_string());
        }
        if let Some(sender_id) = &filter.sender_id {
            q = q.bind(sender_id.clone());
        }
        if let Some(start) = &filter.start {
            q = q.bind(format_datetime(start));
        }
        if let Some(end) = &filter.end {
            q = q.bind(format_datetime(end));
        }

        let rows = q
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let msg_row =
                MessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(msg_row.into_message()?);
        }

        Ok(messages)
    }

    async fn update_status(
        &self,
        tenant_id: &Uuid,
        message_id: i64,
        status: MessageStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE messages SET status = ? WHERE id = ? AND tenant_id = ?")
            .bind(status.to_string())
            .bind(message_id)
            .bind(tenant_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn count_by_session(
        &self,
        tenant_id: &Uuid,
        session_id: &Uuid,
    ) -> Result<u64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) as cnt FROM messages WHERE tenant_id = ? AND session_id = ?",
        )
        .bind(tenant_id.to_string())
        .bind(session_id.to_string())
        .fetch_one(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(count as u64)
    }

    async fn statistics(
        &self,
        tenant_id: &Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<MessageStatistics, RepositoryError> {
        let mut conditions = String::from("tenant_id = ?");
        if start.is_some() {
            conditions.push_str(" AND created_at >= ?");
        }
        if end.is_some() {
            conditions.push_str(" AND created_at <= ?");
        }

        fn bind_range<'q>(
            mut q: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
            tenant_id: &Uuid,
            start: &Option<DateTime<Utc>>,
            end: &Option<DateTime<Utc>>,
        ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
            q = q.bind(tenant_id.to_string());
            if let Some(start) = start {
                q = q.bind(format_datetime(start));
            }
            if let Some(end) = end {
                q = q.bind(format_datetime(end));
            }
            q
        }

        let total_sql = format!("SELECT COUNT(*) as cnt FROM messages WHERE {conditions}");
        let total_row = bind_range(sqlx::query(&total_sql), tenant_id, &start, &end)
            .fetch_one(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let total: i64 = total_row
            .try_get("cnt")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut stats = MessageStatistics {
            total: total as u64,
            ..Default::default()
        };

        let type_sql = format!(
            "SELECT message_type, COUNT(*) as cnt FROM messages WHERE {conditions} GROUP BY message_type"
        );
        let type_rows = bind_range(sqlx::query(&type_sql), tenant_id, &start, &end)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        for row in &type_rows {
            let message_type: String = row
                .try_get("message_type")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let count: i64 = row
                .try_get("cnt")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            stats.by_message_type.insert(message_type, count as u64);
        }

        let sender_sql = format!(
            "SELECT sender_type, COUNT(*) as cnt FROM messages WHERE {conditions} GROUP BY sender_type"
        );
        let sender_rows = bind_range(sqlx::query(&sender_sql), tenant_id, &start, &end)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        for row in &sender_rows {
            let sender_type: String = row
                .try_get("sender_type")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let count: i64 = row
                .try_get("cnt")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            stats.by_sender_type.insert(sender_type, count as u64);
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::session::SqliteSessionRepository;
    use parley_core::session::SessionRepository;
    use parley_types::session::Session;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    async fn seed_session(pool: &DatabasePool, tenant: Uuid, user_id: &str) -> Session {
        let repo = SqliteSessionRepository::new(pool.clone());
        repo.insert(&Session::new(tenant, user_id, "webchat"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let tenant = Uuid::now_v7();
        let session = seed_session(&pool, tenant, "webchat:alice").await;

        let now = Utc::now();
        let mut last = 0;
        for i in 0..3 {
            let draft = MessageDraft::user("webchat:alice", format!("msg {i}"));
            let msg = repo
                .insert(&tenant, &session.id, &draft, now, now)
                .await
                .unwrap();
            assert!(msg.id > last);
            assert_eq!(msg.status, MessageStatus::Sent);
            last = msg.id;
        }
    }

    #[tokio::test]
    async fn test_get_scoped_by_tenant() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let tenant = Uuid::now_v7();
        let session = seed_session(&pool, tenant, "webchat:alice").await;

        let now = Utc::now();
        let draft = MessageDraft::user("webchat:alice", "hello");
        let msg = repo
            .insert(&tenant, &session.id, &draft, now, now)
            .await
            .unwrap();

        assert!(repo.get(&tenant, msg.id).await.unwrap().is_some());
        assert!(repo.get(&Uuid::now_v7(), msg.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filters() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let tenant = Uuid::now_v7();
        let session = seed_session(&pool, tenant, "webchat:alice").await;

        let base = Utc::now();
        for i in 0..5i64 {
            let draft = MessageDraft::user("webchat:alice", format!("msg {i}"));
            let at = base + chrono::Duration::seconds(i);
            repo.insert(&tenant, &session.id, &draft, at, at)
                .await
                .unwrap();
        }

        let page = repo
            .list_by_session(&tenant, &session.id, &MessageFilter::default(), 3, 0)
            .await
            .unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].content, "msg 4");
        assert_eq!(page[2].content, "msg 2");

        let filter = MessageFilter {
            before: Some(base + chrono::Duration::seconds(2)),
            ..Default::default()
        };
        let older = repo
            .list_by_session(&tenant, &session.id, &filter, 50, 0)
            .await
            .unwrap();
        assert_eq!(older.len(), 2);

        let filter = MessageFilter {
            after: Some(base + chrono::Duration::seconds(2)),
            ..Default::default()
        };
        let newer = repo
            .list_by_session(&tenant, &session.id, &filter, 50, 0)
            .await
            .unwrap();
        assert_eq!(newer.len(), 2);
    }

    #[tokio::test]
    async fn test_equal_timestamps_break_ties_by_id() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let tenant = Uuid::now_v7();
        let session = seed_session(&pool, tenant, "webchat:alice").await;

        let at = Utc::now();
        for i in 0..3 {
            let draft = MessageDraft::user("webchat:alice", format!("msg {i}"));
            repo.insert(&tenant, &session.id, &draft, at, at)
                .await
                .unwrap();
        }

        let page = repo
            .list_by_session(&tenant, &session.id, &MessageFilter::default(), 50, 0)
            .await
            .unwrap();
        assert_eq!(page[0].content, "msg 2");
        assert_eq!(page[2].content, "msg 0");
    }

    #[tokio::test]
    async fn test_search_is_tenant_scoped_substring() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let tenant_a = Uuid::now_v7();
        let tenant_b = Uuid::now_v7();
        let session_a = seed_session(&pool, tenant_a, "webchat:alice").await;
        let session_b = seed_session(&pool, tenant_b, "webchat:bob").await;

        let now = Utc::now();
        repo.insert(
            &tenant_a,
            &session_a.id,
            &MessageDraft::user("webchat:alice", "my invoice is wrong"),
            now,
            now,
        )
        .await
        .unwrap();
        repo.insert(
            &tenant_b,
            &session_b.id,
            &MessageDraft::user("webchat:bob", "invoice question"),
            now,
            now,
        )
        .await
        .unwrap();

        let hits = repo
            .search(&tenant_a, "invoice", &SearchFilter::default(), 50, 0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tenant_id, tenant_a);

        let hits = repo
            .search(&tenant_a, "refund", &SearchFilter::default(), 50, 0)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_escapes_like_wildcards() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let tenant = Uuid::now_v7();
        let session = seed_session(&pool, tenant, "webchat:alice").await;

        let now = Utc::now();
        repo.insert(
            &tenant,
            &session.id,
            &MessageDraft::user("webchat:alice", "discount is 50% off"),
            now,
            now,
        )
        .await
        .unwrap();
        repo.insert(
            &tenant,
            &session.id,
            &MessageDraft::user("webchat:alice", "discount is 50 dollars off"),
            now,
            now,
        )
        .await
        .unwrap();

        // A literal '%' must not act as a wildcard.
        let hits = repo
            .search(&tenant, "50% off", &SearchFilter::default(), 50, 0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains('%'));
    }

    #[tokio::test]
    async fn test_search_filters_by_sender_and_session() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let tenant = Uuid::now_v7();
        let session_a = seed_session(&pool, tenant, "webchat:alice").await;
        let session_b = seed_session(&pool, tenant, "webchat:bob").await;

        let now = Utc::now();
        repo.insert(
            &tenant,
            &session_a.id,
            &MessageDraft::user("webchat:alice", "need help"),
            now,
            now,
        )
        .await
        .unwrap();
        repo.insert(
            &tenant,
            &session_b.id,
            &MessageDraft::user("webchat:bob", "need help too"),
            now,
            now,
        )
        .await
        .unwrap();

        let filter = SearchFilter {
            session_id: Some(session_a.id),
            ..Default::default()
        };
        let hits = repo.search(&tenant, "help", &filter, 50, 0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].session_id, session_a.id);

        let filter = SearchFilter {
            sender_id: Some("webchat:bob".to_string()),
            ..Default::default()
        };
        let hits = repo.search(&tenant, "help", &filter, 50, 0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sender_id, "webchat:bob");
    }

    #[tokio::test]
    async fn test_update_status_scoped_by_tenant() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let tenant = Uuid::now_v7();
        let session = seed_session(&pool, tenant, "webchat:alice").await;

        let now = Utc::now();
        let msg = repo
            .insert(
                &tenant,
                &session.id,
                &MessageDraft::user("webchat:alice", "hi"),
                now,
                now,
            )
            .await
            .unwrap();

        repo.update_status(&tenant, msg.id, MessageStatus::Read)
            .await
            .unwrap();
        let found = repo.get(&tenant, msg.id).await.unwrap().unwrap();
        assert_eq!(found.status, MessageStatus::Read);

        let err = repo
            .update_status(&Uuid::now_v7(), msg.id, MessageStatus::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_attachments_roundtrip() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let tenant = Uuid::now_v7();
        let session = seed_session(&pool, tenant, "webchat:alice").await;

        let now = Utc::now();
        let draft = MessageDraft::user("webchat:alice", "see attached")
            .with_message_type(MessageType::Image)
            .with_attachments(vec![Attachment {
                kind: "image".to_string(),
                url: "https://cdn.example/shot.png".to_string(),
                name: Some("shot.png".to_string()),
                size_bytes: Some(2048),
            }]);
        let msg = repo
            .insert(&tenant, &session.id, &draft, now, now)
            .await
            .unwrap();

        let found = repo.get(&tenant, msg.id).await.unwrap().unwrap();
        assert_eq!(found.message_type, MessageType::Image);
        assert_eq!(found.attachments.len(), 1);
        assert_eq!(found.attachments[0].name.as_deref(), Some("shot.png"));
    }

    #[tokio::test]
    async fn test_statistics_counts_by_type_and_sender() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let tenant = Uuid::now_v7();
        let session = seed_session(&pool, tenant, "webchat:alice").await;

        let now = Utc::now();
        repo.insert(
            &tenant,
            &session.id,
            &MessageDraft::user("webchat:alice", "hi"),
            now,
            now,
        )
        .await
        .unwrap();
        repo.insert(
            &tenant,
            &session.id,
            &MessageDraft::staff("agent-1", "hello"),
            now,
            now,
        )
        .await
        .unwrap();
        repo.insert(
            &tenant,
            &session.id,
            &MessageDraft::system("note"),
            now,
            now,
        )
        .await
        .unwrap();

        let stats = repo.statistics(&tenant, None, None).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_message_type.get("text"), Some(&2));
        assert_eq!(stats.by_message_type.get("system"), Some(&1));
        assert_eq!(stats.by_sender_type.get("user"), Some(&1));
        assert_eq!(stats.by_sender_type.get("staff"), Some(&1));
        assert_eq!(stats.by_sender_type.get("system"), Some(&1));

        // Out-of-range window counts nothing.
        let stats = repo
            .statistics(
                &tenant,
                Some(now + chrono::Duration::hours(1)),
                None,
            )
            .await
            .unwrap();
        assert_eq!(stats.total, 0);
    }
}
