//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and
//! REST API. Services are generic over the repository traits, but
//! AppState pins them to the SQLite implementations from parley-infra.

use std::path::PathBuf;
use std::sync::Arc;

use parley_core::context::ContextBuilder;
use parley_core::message::MessageStore;
use parley_core::realtime::Broadcaster;
use parley_core::session::SessionLifecycle;
use parley_infra::sqlite::message::SqliteMessageRepository;
use parley_infra::sqlite::pool::DatabasePool;
use parley_infra::sqlite::session::SqliteSessionRepository;

use crate::http::handlers::ws::WsSink;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteLifecycle = SessionLifecycle<SqliteSessionRepository>;
pub type ConcreteMessageStore = MessageStore<SqliteMessageRepository, SqliteSessionRepository>;
pub type ConcreteContextBuilder = ContextBuilder<SqliteMessageRepository, SqliteSessionRepository>;
pub type ConcreteBroadcaster = Broadcaster<SqliteSessionRepository, WsSink>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST/WebSocket handlers.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<ConcreteLifecycle>,
    pub message_store: Arc<ConcreteMessageStore>,
    pub context_builder: Arc<ConcreteContextBuilder>,
    pub broadcaster: Arc<ConcreteBroadcaster>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: connect to DB, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir).await?;

        // Initialize database
        let db_url = format!("sqlite://{}?mode=rwc", data_dir.join("parley.db").display());
        let db_pool = DatabasePool::new(&db_url).await?;

        // Repository instances are cheap pool handles; each service gets
        // its own.
        let session_repo = SqliteSessionRepository::new(db_pool.clone());
        let message_repo = SqliteMessageRepository::new(db_pool.clone());

        let lifecycle = SessionLifecycle::new(session_repo.clone());
        let message_store = MessageStore::new(
            message_repo.clone(),
            SessionLifecycle::new(session_repo.clone()),
        );
        let context_builder = ContextBuilder::new(
            message_repo,
            SessionLifecycle::new(session_repo.clone()),
        );
        let broadcaster = Broadcaster::new(SessionLifecycle::new(session_repo));

        Ok(Self {
            lifecycle: Arc::new(lifecycle),
            message_store: Arc::new(message_store),
            context_builder: Arc::new(context_builder),
            broadcaster: Arc::new(broadcaster),
            data_dir,
            db_pool,
        })
    }
}

/// Resolve the data directory: `PARLEY_DATA_DIR`, or `~/.parley`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PARLEY_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parley")
}
