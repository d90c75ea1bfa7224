//! Session Manager - server-side sessions referenced by an opaque cookie
//!
//! The `SessionManager` is the single source of truth for session lifetime.
//! Records live in a [`SessionStore`]; the browser only ever sees the random
//! identifier in the `sessionId` cookie.
//!
//! ## Organization
//!
//! 1. **Construction** - building the manager from settings
//! 2. **Lifecycle** - create, resolve, renew and destroy
//! 3. **Cookies** - transport cookie helpers
//! 4. **Tests**

use actix_web::{cookie::Cookie, HttpRequest};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::{SessionId, SessionRecord, UserIdentity};
use crate::session::cookie::{CookieFactory, SESSION_COOKIE};
use crate::settings::SessionSettings;
use crate::storage::SessionStore;
use crate::utils::crypto::generate_token;

/// Bytes of randomness in a session identifier (256 bits)
pub const SESSION_ID_BYTES: usize = 32;

fn seconds(value: u64) -> Duration {
    Duration::seconds(i64::from(u32::try_from(value).unwrap_or(u32::MAX)))
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cookie_factory: CookieFactory,
    ttl: Duration,
    renew_within: Duration,
    grace: Duration,
}

// =============================================================================
// 1. Construction
// =============================================================================

impl SessionManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        cookie_factory: CookieFactory,
        settings: &SessionSettings,
    ) -> Self {
        Self {
            store,
            cookie_factory,
            ttl: seconds(settings.ttl_seconds),
            renew_within: seconds(settings.renew_within_seconds),
            grace: seconds(settings.store_grace_seconds),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn cookie_factory(&self) -> &CookieFactory {
        &self.cookie_factory
    }
}

// =============================================================================
// 2. Lifecycle
// =============================================================================

impl SessionManager {
    /// Start a session for a verified identity
    ///
    /// The returned record carries the new identifier; send it to the client
    /// with [`Self::session_cookie`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::DatabaseUnavailable` if the store write fails
    pub async fn create_session(&self, identity: UserIdentity) -> AppResult<SessionRecord> {
        self.create_session_at(identity, Utc::now()).await
    }

    /// [`Self::create_session`] with an explicit clock
    ///
    /// # Errors
    ///
    /// Returns `AppError::DatabaseUnavailable` if the store write fails
    pub async fn create_session_at(
        &self,
        identity: UserIdentity,
        now: DateTime<Utc>,
    ) -> AppResult<SessionRecord> {
        let session_id = SessionId::new(generate_token(SESSION_ID_BYTES));
        let record = SessionRecord::new(session_id, identity, now, self.ttl);
        self.persist(&record, now).await?;

        log::info!(
            "Created session for provider_id {} expiring at {}",
            record.identity.provider_id,
            record.expires_at
        );
        Ok(record)
    }

    /// Look up a session and check it has not expired
    ///
    /// # Errors
    ///
    /// - `AppError::SessionNotFound` if the store has no record
    /// - `AppError::SessionExpired` if `now >= expires_at`
    /// - `AppError::DatabaseUnavailable` if the store read fails
    pub async fn resolve_session(&self, session_id: &SessionId) -> AppResult<SessionRecord> {
        self.resolve_session_at(session_id, Utc::now()).await
    }

    /// [`Self::resolve_session`] with an explicit clock
    ///
    /// # Errors
    ///
    /// See [`Self::resolve_session`]
    pub async fn resolve_session_at(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> AppResult<SessionRecord> {
        let Some(record) = self.store.load(session_id).await? else {
            log::debug!("Session lookup missed");
            return Err(AppError::SessionNotFound);
        };

        if record.is_expired_at(now) {
            log::debug!(
                "Session for provider_id {} expired at {}",
                record.identity.provider_id,
                record.expires_at
            );
            return Err(AppError::SessionExpired);
        }

        Ok(record)
    }

    /// Rolling renewal
    ///
    /// Returns the extended record when the remaining lifetime is inside the
    /// renewal window, `None` when no renewal was due or renewal is disabled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DatabaseUnavailable` if the store write fails
    pub async fn renew_session(&self, session: &SessionRecord) -> AppResult<Option<SessionRecord>> {
        self.renew_session_at(session, Utc::now()).await
    }

    /// [`Self::renew_session`] with an explicit clock
    ///
    /// # Errors
    ///
    /// Returns `AppError::DatabaseUnavailable` if the store write fails
    pub async fn renew_session_at(
        &self,
        session: &SessionRecord,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SessionRecord>> {
        if self.renew_within <= Duration::zero() || session.remaining_at(now) > self.renew_within {
            return Ok(None);
        }

        let mut renewed = session.clone();
        renewed.expires_at = now + self.ttl;
        self.persist(&renewed, now).await?;

        log::debug!(
            "Renewed session for provider_id {} until {}",
            renewed.identity.provider_id,
            renewed.expires_at
        );
        Ok(Some(renewed))
    }

    /// Remove a session; destroying an unknown id succeeds
    ///
    /// # Errors
    ///
    /// Returns `AppError::DatabaseUnavailable` if the store delete fails
    pub async fn destroy_session(&self, session_id: &SessionId) -> AppResult<()> {
        self.store.delete(session_id).await?;
        log::info!("Destroyed session");
        Ok(())
    }

    async fn persist(&self, record: &SessionRecord, now: DateTime<Utc>) -> AppResult<()> {
        let retain = (record.expires_at - now + self.grace)
            .to_std()
            .unwrap_or_default();
        self.store.save(record, retain).await
    }
}

// =============================================================================
// 3. Cookies
// =============================================================================

impl SessionManager {
    /// Session id presented by the client, if any
    #[must_use]
    pub fn session_id_from_request(req: &HttpRequest) -> Option<SessionId> {
        req.cookie(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
            .map(SessionId::new)
    }

    #[must_use]
    pub fn session_cookie(&self, record: &SessionRecord) -> Cookie<'static> {
        self.cookie_factory
            .create_session_cookie(record.session_id.as_str(), record.expires_at)
    }

    #[must_use]
    pub fn expired_session_cookie(&self) -> Cookie<'static> {
        self.cookie_factory.create_expired_cookie(SESSION_COOKIE)
    }
}

// =============================================================================
// 4. Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemorySessionStore;
    use crate::utils::crypto::derive_key;
    use actix_web::test::TestRequest;

    fn identity() -> UserIdentity {
        UserIdentity {
            provider_id: "108".to_string(),
            display_name: "Ada".to_string(),
            email: Some("ada@example.com".to_string()),
        }
    }

    fn manager_with(settings: &SessionSettings) -> SessionManager {
        SessionManager::new(
            Arc::new(MemorySessionStore::default()),
            CookieFactory::new(derive_key(b"secret", "oauth-state"), false),
            settings,
        )
    }

    fn manager() -> SessionManager {
        manager_with(&SessionSettings {
            secret: "secret".to_string(),
            ttl_seconds: 60,
            renew_within_seconds: 0,
            store_grace_seconds: 300,
        })
    }

    #[actix_web::test]
    async fn test_create_then_resolve_returns_identity() {
        let manager = manager();
        let record = manager.create_session(identity()).await.unwrap();

        assert_eq!(record.session_id.as_str().len(), 43);
        assert_eq!(record.expires_at - record.created_at, Duration::seconds(60));

        let resolved = manager.resolve_session(&record.session_id).await.unwrap();
        assert_eq!(resolved.identity, identity());
    }

    #[actix_web::test]
    async fn test_session_ids_are_unique() {
        let manager = manager();
        let a = manager.create_session(identity()).await.unwrap();
        let b = manager.create_session(identity()).await.unwrap();
        assert_ne!(a.session_id, b.session_id);
    }

    #[actix_web::test]
    async fn test_resolve_after_expiry_is_expired() {
        let manager = manager();
        let now = Utc::now();
        let record = manager.create_session_at(identity(), now).await.unwrap();

        let at_expiry = manager
            .resolve_session_at(&record.session_id, now + Duration::seconds(60))
            .await;
        assert!(matches!(at_expiry, Err(AppError::SessionExpired)));

        let just_before = manager
            .resolve_session_at(&record.session_id, now + Duration::seconds(59))
            .await;
        assert!(just_before.is_ok());
    }

    #[actix_web::test]
    async fn test_destroy_then_resolve_is_not_found() {
        let manager = manager();
        let record = manager.create_session(identity()).await.unwrap();

        manager.destroy_session(&record.session_id).await.unwrap();
        assert!(matches!(
            manager.resolve_session(&record.session_id).await,
            Err(AppError::SessionNotFound)
        ));

        // Idempotent
        manager.destroy_session(&record.session_id).await.unwrap();
    }

    #[actix_web::test]
    async fn test_unknown_id_is_not_found() {
        let result = manager().resolve_session(&SessionId::from("nope")).await;
        assert!(matches!(result, Err(AppError::SessionNotFound)));
    }

    #[actix_web::test]
    async fn test_renewal_inside_window_extends_expiry() {
        let manager = manager_with(&SessionSettings {
            secret: "secret".to_string(),
            ttl_seconds: 60,
            renew_within_seconds: 20,
            store_grace_seconds: 300,
        });
        let start = Utc::now();
        let record = manager.create_session_at(identity(), start).await.unwrap();

        // 30s left: outside the window
        let early = manager
            .renew_session_at(&record, start + Duration::seconds(30))
            .await
            .unwrap();
        assert!(early.is_none());

        // 15s left: renewed to a full TTL from now
        let later = start + Duration::seconds(45);
        let renewed = manager.renew_session_at(&record, later).await.unwrap().unwrap();
        assert_eq!(renewed.expires_at, later + Duration::seconds(60));
        assert_eq!(renewed.session_id, record.session_id);

        // The store sees the new expiry
        let resolved = manager
            .resolve_session_at(&record.session_id, start + Duration::seconds(90))
            .await
            .unwrap();
        assert_eq!(resolved.expires_at, renewed.expires_at);
    }

    #[actix_web::test]
    async fn test_renewal_disabled_when_window_is_zero() {
        let manager = manager();
        let start = Utc::now();
        let record = manager.create_session_at(identity(), start).await.unwrap();
        let result = manager
            .renew_session_at(&record, start + Duration::seconds(59))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_session_id_from_request() {
        let req = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE, "abc"))
            .to_http_request();
        assert_eq!(
            SessionManager::session_id_from_request(&req),
            Some(SessionId::from("abc"))
        );

        let empty = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE, ""))
            .to_http_request();
        assert_eq!(SessionManager::session_id_from_request(&empty), None);
    }
}
