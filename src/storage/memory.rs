//! Process-local stores
//!
//! Each store is one map behind a `tokio::sync::RwLock`, so every write is
//! atomic with respect to other requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DocumentStore, SessionStore, UserStore};
use crate::error::AppResult;
use crate::models::{Document, SessionId, SessionRecord, UserIdentity, UserRecord};

struct StoredSession {
    record: SessionRecord,
    purge_at: Instant,
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, StoredSession>>,
}

impl MemorySessionStore {
    /// Number of retained records, expired or not
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, record: &SessionRecord, retain: Duration) -> AppResult<()> {
        let stored = StoredSession {
            record: record.clone(),
            purge_at: Instant::now() + retain,
        };
        let mut sessions = self.sessions.write().await;
        // Drop whatever has outlived its retention while we hold the lock
        let now = Instant::now();
        sessions.retain(|_, s| s.purge_at > now);
        sessions.insert(record.session_id.clone(), stored);
        Ok(())
    }

    async fn load(&self, session_id: &SessionId) -> AppResult<Option<SessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .filter(|s| s.purge_at > Instant::now())
            .map(|s| s.record.clone()))
    }

    async fn delete(&self, session_id: &SessionId) -> AppResult<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<(String, String), UserRecord>>,
}

impl MemoryUserStore {
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn upsert(
        &self,
        provider: &str,
        identity: &UserIdentity,
        now: DateTime<Utc>,
    ) -> AppResult<UserRecord> {
        let mut users = self.users.write().await;
        let record = users
            .entry((provider.to_string(), identity.provider_id.clone()))
            .and_modify(|existing| {
                existing.display_name.clone_from(&identity.display_name);
                existing.email.clone_from(&identity.email);
                existing.last_login_at = now;
            })
            .or_insert_with(|| UserRecord {
                provider: provider.to_string(),
                provider_id: identity.provider_id.clone(),
                display_name: identity.display_name.clone(),
                email: identity.email.clone(),
                created_at: now,
                last_login_at: now,
            });
        Ok(record.clone())
    }

    async fn find(&self, provider: &str, provider_id: &str) -> AppResult<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users
            .get(&(provider.to_string(), provider_id.to_string()))
            .cloned())
    }
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, HashMap<Uuid, Document>>>,
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self, collection: &str) -> AppResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let mut documents: Vec<Document> = collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        documents.sort_by_key(|doc| doc.created_at);
        Ok(documents)
    }

    async fn get(&self, collection: &str, id: Uuid) -> AppResult<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(&id))
            .cloned())
    }

    async fn save(&self, document: &Document) -> AppResult<()> {
        self.collections
            .write()
            .await
            .entry(document.collection.clone())
            .or_default()
            .insert(document.id, document.clone());
        Ok(())
    }

    async fn delete(&self, collection: &str, id: Uuid) -> AppResult<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(&id))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn identity(name: &str) -> UserIdentity {
        UserIdentity {
            provider_id: "108".to_string(),
            display_name: name.to_string(),
            email: None,
        }
    }

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[actix_web::test]
    async fn test_session_retention() {
        let store = MemorySessionStore::default();
        let record = SessionRecord::new(
            SessionId::from("s1"),
            identity("Ada"),
            Utc::now(),
            chrono::Duration::seconds(60),
        );

        store.save(&record, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.load(&record.session_id).await.unwrap(), Some(record.clone()));

        store.delete(&record.session_id).await.unwrap();
        assert_eq!(store.load(&record.session_id).await.unwrap(), None);
        // Deleting twice is fine
        store.delete(&record.session_id).await.unwrap();

        store.save(&record, Duration::ZERO).await.unwrap();
        assert_eq!(store.load(&record.session_id).await.unwrap(), None);
    }

    #[actix_web::test]
    async fn test_user_upsert_keeps_created_at() {
        let store = MemoryUserStore::default();
        let first = Utc::now();
        let later = first + chrono::Duration::minutes(5);

        let created = store.upsert("google", &identity("Ada"), first).await.unwrap();
        let updated = store.upsert("google", &identity("Ada L."), later).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(created.created_at, first);
        assert_eq!(updated.created_at, first);
        assert_eq!(updated.last_login_at, later);
        assert_eq!(updated.display_name, "Ada L.");

        // Same provider id under another provider is another user
        store.upsert("github", &identity("Ada"), later).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert!(store.find("github", "108").await.unwrap().is_some());
        assert!(store.find("github", "999").await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn test_documents_are_scoped_by_collection() {
        let store = MemoryDocumentStore::default();
        let course = Document::new("courses", "108", body(json!({"title": "Rust"})));
        store.save(&course).await.unwrap();

        assert_eq!(store.list("courses").await.unwrap().len(), 1);
        assert!(store.list("tutorials").await.unwrap().is_empty());
        assert!(store.get("tutorials", course.id).await.unwrap().is_none());
        assert_eq!(store.get("courses", course.id).await.unwrap(), Some(course.clone()));

        assert!(store.delete("courses", course.id).await.unwrap());
        assert!(!store.delete("courses", course.id).await.unwrap());
    }
}
