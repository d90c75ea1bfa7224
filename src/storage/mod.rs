//! Persistence for sessions, users and documents
//!
//! Three narrow async traits sit in front of the database. The backend is
//! picked from the scheme of `database.url` at startup:
//!
//! - `redis://` / `rediss://` : [`redis_backend`], one multiplexed connection
//!   manager shared by all three stores
//! - `memory://` : [`memory`], process-local maps for development and tests
//!
//! Every write is a single atomic operation on one record.

pub mod memory;
pub mod redis_backend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Document, SessionId, SessionRecord, UserIdentity, UserRecord};
use crate::settings::DatabaseSettings;

/// Session persistence
///
/// `load` returns records past `expires_at` while the store still retains
/// them; deciding expiry is the session manager's job.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or overwrite a record, keeping it for `retain` from now
    async fn save(&self, record: &SessionRecord, retain: Duration) -> AppResult<()>;

    async fn load(&self, session_id: &SessionId) -> AppResult<Option<SessionRecord>>;

    /// Remove a record; removing an unknown id is not an error
    async fn delete(&self, session_id: &SessionId) -> AppResult<()>;

    /// Round trip to the backing store
    async fn ping(&self) -> AppResult<()>;
}

/// User records keyed by `(provider, provider_id)`
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create the user on first login, refresh profile fields afterwards
    ///
    /// `created_at` is only ever written by the call that creates the record.
    async fn upsert(
        &self,
        provider: &str,
        identity: &UserIdentity,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord>;

    async fn find(&self, provider: &str, provider_id: &str) -> AppResult<Option<UserRecord>>;
}

/// Schemaless documents grouped by collection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents of a collection, oldest first
    async fn list(&self, collection: &str) -> AppResult<Vec<Document>>;

    async fn get(&self, collection: &str, id: Uuid) -> AppResult<Option<Document>>;

    /// Insert or overwrite by `(collection, id)`
    async fn save(&self, document: &Document) -> AppResult<()>;

    /// Returns whether a document was removed
    async fn delete(&self, collection: &str, id: Uuid) -> AppResult<bool>;
}

/// The three stores handed to the application context
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub users: Arc<dyn UserStore>,
    pub documents: Arc<dyn DocumentStore>,
}

impl Stores {
    /// Fresh process-local stores
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            sessions: Arc::new(memory::MemorySessionStore::default()),
            users: Arc::new(memory::MemoryUserStore::default()),
            documents: Arc::new(memory::MemoryDocumentStore::default()),
        }
    }
}

/// Storage backend selected by URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Redis,
    Memory,
}

impl BackendKind {
    /// # Errors
    ///
    /// Returns `AppError::Configuration` for unparseable URLs and unknown schemes
    pub fn from_url(database_url: &str) -> AppResult<Self> {
        let parsed = url::Url::parse(database_url)
            .map_err(|e| AppError::Configuration(format!("Invalid database url: {e}")))?;
        match parsed.scheme() {
            "redis" | "rediss" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(AppError::Configuration(format!(
                "Unsupported database scheme '{other}' (expected redis://, rediss:// or memory://)"
            ))),
        }
    }
}

/// Connect to the configured database once, at startup
///
/// # Errors
///
/// - `AppError::Configuration` if the URL is missing or has an unsupported scheme
/// - `AppError::DatabaseUnavailable` if the server cannot be reached in time
pub async fn connect(settings: &DatabaseSettings) -> AppResult<Stores> {
    if settings.url.trim().is_empty() {
        return Err(AppError::Configuration("database url is not set".to_string()));
    }

    match BackendKind::from_url(&settings.url)? {
        BackendKind::Memory => {
            log::warn!("Using in-memory storage; data is lost on restart");
            Ok(Stores::in_memory())
        }
        BackendKind::Redis => {
            let timeout = Duration::from_secs(settings.connect_timeout_seconds.max(1));
            let backend = redis_backend::RedisBackend::connect(&settings.url, timeout).await?;
            log::info!("Connected to Redis");
            Ok(backend.into_stores())
        }
    }
}
