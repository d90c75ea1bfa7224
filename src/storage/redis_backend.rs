//! # Redis
//!
//! Key layout:
//!
//! - `session:{id}` : JSON session record, `SET .. EX` so Redis drops it
//!   after `expires_at + grace`
//! - `user:{provider}:{provider_id}` : hash of profile fields; `created_at`
//!   written with `HSETNX`, the rest with `HSET`, in one `MULTI/EXEC`
//! - `docs:{collection}` : hash of document id -> JSON document
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{DocumentStore, SessionStore, Stores, UserStore};
use crate::error::{AppError, AppResult};
use crate::models::{Document, SessionId, SessionRecord, UserIdentity, UserRecord};

fn session_key(session_id: &SessionId) -> String {
    format!("session:{session_id}")
}

fn user_key(provider: &str, provider_id: &str) -> String {
    format!("user:{provider}:{provider_id}")
}

fn docs_key(collection: &str) -> String {
    format!("docs:{collection}")
}

/// Shared connection; `ConnectionManager` reconnects on its own and is cheap to clone
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Open the connection and confirm the server answers `PING`
    ///
    /// # Errors
    ///
    /// - `AppError::Configuration` if the URL is not a valid Redis URL
    /// - `AppError::DatabaseUnavailable` on connection failure or timeout
    pub async fn connect(redis_url: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| AppError::Configuration(format!("Invalid Redis url: {e}")))?;

        let conn = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| {
                AppError::DatabaseUnavailable(format!("Redis connect timed out after {timeout:?}"))
            })??;

        let backend = Self { conn };
        tokio::time::timeout(timeout, backend.round_trip())
            .await
            .map_err(|_| AppError::DatabaseUnavailable("Redis PING timed out".to_string()))??;

        Ok(backend)
    }

    #[must_use]
    pub fn into_stores(self) -> Stores {
        let shared = Arc::new(self);
        Stores {
            sessions: shared.clone(),
            users: shared.clone(),
            documents: shared,
        }
    }

    async fn round_trip(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(AppError::DatabaseUnavailable(format!("Unexpected PING reply: {reply}")))
        }
    }
}

#[async_trait]
impl SessionStore for RedisBackend {
    async fn save(&self, record: &SessionRecord, retain: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(record)?;
        let seconds = retain.as_secs().max(1);
        let _: () = conn
            .set_ex(session_key(&record.session_id), payload, seconds)
            .await?;
        Ok(())
    }

    async fn load(&self, session_id: &SessionId) -> AppResult<Option<SessionRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(session_key(session_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, session_id: &SessionId) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(session_key(session_id)).await?;
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        self.round_trip().await
    }
}

/// Rebuild a user record from its hash fields
fn user_from_fields(mut fields: HashMap<String, String>) -> AppResult<UserRecord> {
    let mut take = |name: &str| {
        fields
            .remove(name)
            .ok_or_else(|| AppError::Internal(format!("user record is missing field {name}")))
    };

    let provider = take("provider")?;
    let provider_id = take("provider_id")?;
    let display_name = take("display_name")?;
    let email = take("email")?;
    let created_at = parse_timestamp(&take("created_at")?)?;
    let last_login_at = parse_timestamp(&take("last_login_at")?)?;

    Ok(UserRecord {
        provider,
        provider_id,
        display_name,
        email: (!email.is_empty()).then_some(email),
        created_at,
        last_login_at,
    })
}

fn parse_timestamp(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("invalid stored timestamp: {e}")))
}

#[async_trait]
impl UserStore for RedisBackend {
    async fn upsert(
        &self,
        provider: &str,
        identity: &UserIdentity,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord> {
        let mut conn = self.conn.clone();
        let key = user_key(provider, &identity.provider_id);
        let timestamp = now.to_rfc3339();

        let (fields,): (HashMap<String, String>,) = redis::pipe()
            .atomic()
            .hset_nx(&key, "created_at", &timestamp)
            .ignore()
            .hset_multiple(
                &key,
                &[
                    ("provider", provider),
                    ("provider_id", identity.provider_id.as_str()),
                    ("display_name", identity.display_name.as_str()),
                    ("email", identity.email.as_deref().unwrap_or("")),
                    ("last_login_at", timestamp.as_str()),
                ],
            )
            .ignore()
            .hgetall(&key)
            .query_async(&mut conn)
            .await?;

        user_from_fields(fields)
    }

    async fn find(&self, provider: &str, provider_id: &str) -> AppResult<Option<UserRecord>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(user_key(provider, provider_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        user_from_fields(fields).map(Some)
    }
}

#[async_trait]
impl DocumentStore for RedisBackend {
    async fn list(&self, collection: &str) -> AppResult<Vec<Document>> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn.hvals(docs_key(collection)).await?;
        let mut documents = values
            .iter()
            .map(|json| serde_json::from_str::<Document>(json))
            .collect::<Result<Vec<_>, _>>()?;
        documents.sort_by_key(|doc| doc.created_at);
        Ok(documents)
    }

    async fn get(&self, collection: &str, id: Uuid) -> AppResult<Option<Document>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(docs_key(collection), id.to_string()).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, document: &Document) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(document)?;
        let _: () = conn
            .hset(docs_key(&document.collection), document.id.to_string(), payload)
            .await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: Uuid) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.hdel(docs_key(collection), id.to_string()).await?;
        Ok(removed > 0)
    }
}
