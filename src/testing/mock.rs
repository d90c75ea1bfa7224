//! Mock objects and fake implementations for testing

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::models::{SessionId, SessionRecord, UserIdentity};
use crate::oauth::{IdentityProvider, OAuthCallback};
use crate::storage::SessionStore;

use super::constants::{TEST_EMAIL, TEST_PROVIDER, TEST_PROVIDER_ID, TEST_USER_NAME, VALID_GRANT};

/// Identity provider that accepts exactly one authorization code
#[derive(Default)]
pub struct MockProvider {
    exchanges: AtomicUsize,
}

impl MockProvider {
    /// Number of grant exchanges attempted so far
    #[must_use]
    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    fn name(&self) -> &str {
        TEST_PROVIDER
    }

    fn authorization_url(&self, state: &str) -> String {
        format!("https://idp.example.test/authorize?client_id=test&state={state}")
    }

    async fn exchange_grant(&self, grant: &str) -> AppResult<UserIdentity> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if grant == VALID_GRANT {
            Ok(UserIdentity {
                provider_id: TEST_PROVIDER_ID.to_string(),
                display_name: TEST_USER_NAME.to_string(),
                email: Some(TEST_EMAIL.to_string()),
            })
        } else {
            Err(AppError::AuthProvider("invalid_grant".to_string()))
        }
    }
}

/// Callback parameters as the provider would send them
pub struct MockOAuthCallback;

impl MockOAuthCallback {
    #[must_use]
    pub fn success(code: &str, state: &str) -> OAuthCallback {
        OAuthCallback {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            ..OAuthCallback::default()
        }
    }

    #[must_use]
    pub fn error(error: &str, state: Option<&str>) -> OAuthCallback {
        OAuthCallback {
            state: state.map(ToString::to_string),
            error: Some(error.to_string()),
            ..OAuthCallback::default()
        }
    }
}

/// Session store whose backend never answers
#[derive(Default)]
pub struct UnavailableSessionStore;

impl UnavailableSessionStore {
    fn down() -> AppError {
        AppError::DatabaseUnavailable("connection refused".to_string())
    }
}

#[async_trait]
impl SessionStore for UnavailableSessionStore {
    async fn save(&self, _record: &SessionRecord, _retain: Duration) -> AppResult<()> {
        Err(Self::down())
    }

    async fn load(&self, _session_id: &SessionId) -> AppResult<Option<SessionRecord>> {
        Err(Self::down())
    }

    async fn delete(&self, _session_id: &SessionId) -> AppResult<()> {
        Err(Self::down())
    }

    async fn ping(&self) -> AppResult<()> {
        Err(Self::down())
    }
}
